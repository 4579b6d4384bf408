//! Interactive session loop

use crate::confirm::LineSource;
use owo_colors::OwoColorize;
use std::io::{self, Write};
use warden_common::orchestrator::is_exit_command;
use warden_common::Orchestrator;

fn print_banner(out: &mut impl Write, orch: &Orchestrator) -> io::Result<()> {
    let rule = "=".repeat(60);
    writeln!(out, "{}", rule)?;
    writeln!(out, "{}", "🤖 Warden - natural-language system agent".bright_cyan().bold())?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "Project root: {}", orch.policy().project_root().display())?;
    if let Some(path) = orch.audit().path() {
        writeln!(out, "Audit log:    {}", path.display())?;
    }
    writeln!(out, "Type 'exit' or 'quit' to end the session.")?;
    writeln!(out, "{}", rule)?;
    Ok(())
}

/// Read requests until an exit word or end of input.
///
/// The session end is recorded on both paths; Ctrl-C is handled by
/// [`crate::interrupt`].
pub fn run(
    orch: &mut Orchestrator,
    mut input: impl LineSource,
    mut out: impl Write,
) -> io::Result<()> {
    print_banner(&mut out, orch)?;

    loop {
        write!(out, "\n{} ", "You:".bright_green().bold())?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            writeln!(out, "👋 Goodbye!")?;
            break;
        }

        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        if is_exit_command(request) {
            writeln!(out, "👋 Goodbye! Ending session...")?;
            break;
        }

        let response = orch.process_turn(request);
        if let Some(intent) = orch.last_intent() {
            let summary = format!(
                "   Intent: {} (confidence: {:.2})",
                intent.name(),
                intent.confidence
            );
            writeln!(out, "{}", summary.dimmed())?;
        }
        writeln!(out, "\n🤖 Agent: {}", response)?;
    }

    orch.end_session();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use warden_common::orchestrator::ScriptedConfirmer;
    use warden_common::{FakeCompletionService, WardenConfig};

    fn orchestrator(dir: &tempfile::TempDir) -> Orchestrator {
        let mut config = WardenConfig::default();
        config.security.project_root = dir.path().to_path_buf();
        config.logging.log_file = dir.path().join("agent_log.txt");
        Orchestrator::from_config(
            &config,
            Box::new(FakeCompletionService::always("no idea")),
            Box::new(ScriptedConfirmer::always(false)),
        )
        .unwrap()
    }

    #[test]
    fn test_exit_word_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(&dir);
        let mut out = Vec::new();

        run(&mut orch, Cursor::new("hello\n\n   \nQUIT\nhello again\n"), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("🤖 Agent: ").count(), 1);
        assert!(text.contains("🤖 Agent: I'm here to help!"));
        assert!(text.contains("Goodbye! Ending session..."));
        assert!(orch.audit().is_ended());

        let log = std::fs::read_to_string(dir.path().join("agent_log.txt")).unwrap();
        assert!(log.contains("Session Ended: "));
    }

    #[test]
    fn test_end_of_input_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(&dir);
        let mut out = Vec::new();

        run(&mut orch, Cursor::new("hi"), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Intent: chat (confidence: 0.30)"));
        assert!(orch.audit().is_ended());
    }
}

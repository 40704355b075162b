use async_trait::async_trait;

use crate::error::{EngineError, Result};

/// Starts the game. Returns once the launch was handed off; the game itself
/// is observed through the process monitor.
#[async_trait]
pub trait GameLauncher: Send + Sync {
    async fn launch(&self) -> Result<()>;
}

/// Runs the configured launch command (for instance a `steam://` URL opener)
/// without waiting for it.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    command: Vec<String>,
}

impl CommandLauncher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl GameLauncher for CommandLauncher {
    async fn launch(&self) -> Result<()> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(EngineError::Launch("no launch command configured".into()));
        };

        tracing::info!(program = %program, ?args, "Launching game");
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Launch(format!("{program}: {e}")))?;
        drop(child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let result = CommandLauncher::new(vec![]).launch().await;
        assert!(matches!(result, Err(EngineError::Launch(_))));
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let result = CommandLauncher::new(vec!["savesync-no-such-program".into()])
            .launch()
            .await;
        assert!(matches!(result, Err(EngineError::Launch(_))));
    }
}

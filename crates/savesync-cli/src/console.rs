//! Terminal implementations of the dialog, clipboard and browser services.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use savesync_engine::collaborators::{
    ButtonTypes, Clipboard, DialogResult, IconType, MessageBox, UrlOpener,
};
use savesync_engine::status::StatusLine;

fn read_line(prompt: String) -> anyhow::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

async fn prompt_line(prompt: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || read_line(prompt)).await?
}

/// Dialogs printed to the terminal, answered on stdin.
pub struct ConsoleMessages;

#[async_trait]
impl MessageBox for ConsoleMessages {
    async fn show(
        &self,
        message: &str,
        title: &str,
        buttons: ButtonTypes,
        icon: IconType,
    ) -> DialogResult {
        let marker = match icon {
            IconType::Information => "i",
            IconType::Warning => "!",
            IconType::Error => "x",
        };
        println!("\n[{marker}] {title}\n{message}");

        let (prompt, answers): (&str, &[(&str, DialogResult)]) = match buttons {
            ButtonTypes::Ok => return DialogResult::Ok,
            ButtonTypes::OkCancel => (
                "[Enter] OK, [c] cancel: ",
                &[("", DialogResult::Ok), ("c", DialogResult::Cancel)],
            ),
            ButtonTypes::YesNo => (
                "[y] yes, [n] no: ",
                &[("y", DialogResult::Yes), ("n", DialogResult::No)],
            ),
            ButtonTypes::YesNoCancel => (
                "[y] yes, [n] no, [c] cancel: ",
                &[
                    ("y", DialogResult::Yes),
                    ("n", DialogResult::No),
                    ("c", DialogResult::Cancel),
                ],
            ),
        };

        loop {
            let answer = match prompt_line(prompt.to_string()).await {
                Ok(answer) => answer.to_lowercase(),
                // stdin closed: nobody can answer.
                Err(_) => return DialogResult::Abort,
            };
            if let Some((_, result)) = answers.iter().find(|(key, _)| *key == answer) {
                return *result;
            }
        }
    }
}

/// Stand-in for the system clipboard: text is pasted on stdin and "copied"
/// by printing it.
pub struct TerminalClipboard;

#[async_trait]
impl Clipboard for TerminalClipboard {
    async fn get_text(&self) -> anyhow::Result<String> {
        prompt_line("Paste here: ".to_string()).await
    }

    async fn set_text(&self, text: &str) -> anyhow::Result<()> {
        println!("{text}");
        Ok(())
    }
}

pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        let mut command = if cfg!(windows) {
            let mut c = std::process::Command::new("cmd");
            c.args(["/C", "start", "", url]);
            c
        } else if cfg!(target_os = "macos") {
            let mut c = std::process::Command::new("open");
            c.arg(url);
            c
        } else {
            let mut c = std::process::Command::new("xdg-open");
            c.arg(url);
            c
        };
        command.spawn()?;
        println!("If no browser opened, visit:\n  {url}");
        Ok(())
    }
}

/// Spinner following a status line until the returned bar is finished.
pub fn status_spinner(status: &StatusLine) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut rx = status.subscribe();
    let bar = pb.clone();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let text = rx.borrow_and_update().status.clone().unwrap_or_default();
            bar.set_message(text);
        }
    });
    pb
}

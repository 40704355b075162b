//! Services the engine consumes from the surrounding shell: dialogs, the
//! clipboard and the system browser.

use std::sync::Arc;

use async_trait::async_trait;
use savesync_storage::auth::AuthPrompt;

/// Buttons shown by a message dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonTypes {
    Ok,
    OkCancel,
    YesNoCancel,
    YesNo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconType {
    Information,
    Warning,
    Error,
}

/// Button the user answered a dialog with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogResult {
    Ok,
    Cancel,
    Yes,
    No,
    Abort,
}

#[async_trait]
pub trait MessageBox: Send + Sync {
    async fn show(
        &self,
        message: &str,
        title: &str,
        buttons: ButtonTypes,
        icon: IconType,
    ) -> DialogResult;
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn get_text(&self) -> anyhow::Result<String>;
    async fn set_text(&self, text: &str) -> anyhow::Result<()>;
}

/// Opens a URL in the user's browser.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Authorization prompt driven by the dialog, clipboard and browser services.
///
/// Backends that display the code to the user expect it to be copied to the
/// clipboard before the dialog is closed.
pub struct ClipboardAuthPrompt {
    messages: Arc<dyn MessageBox>,
    clipboard: Arc<dyn Clipboard>,
    opener: Arc<dyn UrlOpener>,
}

impl ClipboardAuthPrompt {
    pub fn new(
        messages: Arc<dyn MessageBox>,
        clipboard: Arc<dyn Clipboard>,
        opener: Arc<dyn UrlOpener>,
    ) -> Self {
        Self {
            messages,
            clipboard,
            opener,
        }
    }
}

#[async_trait]
impl AuthPrompt for ClipboardAuthPrompt {
    async fn open_authorization_page(&self, provider: &str, url: &str) -> anyhow::Result<()> {
        let answer = self
            .messages
            .show(
                &format!(
                    "After you click OK, a web page asking you to allow SaveSync to access {provider} will open."
                ),
                "Authorization",
                ButtonTypes::OkCancel,
                IconType::Information,
            )
            .await;
        if answer != DialogResult::Ok {
            anyhow::bail!("authorization cancelled by the user");
        }

        if let Err(e) = self.opener.open(url) {
            tracing::warn!(provider, error = %e, "Cannot open browser");
            self.messages
                .show(
                    &format!("Open this address in your browser to continue:\n\n{url}"),
                    "Authorization",
                    ButtonTypes::Ok,
                    IconType::Warning,
                )
                .await;
        }
        Ok(())
    }

    async fn request_code(&self, provider: &str) -> anyhow::Result<String> {
        let answer = self
            .messages
            .show(
                &format!(
                    "Once {provider} shows the authorization code, copy it to the clipboard and then close this dialog with OK."
                ),
                "Authorization",
                ButtonTypes::OkCancel,
                IconType::Information,
            )
            .await;
        if answer != DialogResult::Ok {
            anyhow::bail!("authorization cancelled by the user");
        }

        let code = self.clipboard.get_text().await?;
        let code = code.trim();
        if code.is_empty() {
            anyhow::bail!("the clipboard does not contain an authorization code");
        }
        Ok(code.to_string())
    }

    async fn notify(&self, provider: &str, message: &str) {
        self.messages
            .show(message, provider, ButtonTypes::Ok, IconType::Information)
            .await;
    }
}

use super::{Notifier, NotifyError};

/// Prints the digest instead of delivering it. Used for `--dry-run`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutNotifier;

#[async_trait::async_trait]
impl Notifier for StdoutNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        println!("{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

use crate::scale::HostViewport;

/// One-way channel to whatever embeds the editor
pub trait HostNotifier {
    /// The loaded image changed size; the host should resize to `viewport`
    fn resize(&mut self, viewport: &HostViewport);
}

/// Host that only logs the requested size
#[derive(Debug, Default)]
pub struct LogNotifier;

impl HostNotifier for LogNotifier {
    fn resize(&mut self, viewport: &HostViewport) {
        tracing::info!(
            "Host resize requested: {}x{} (canvas scale {:.3})",
            viewport.width,
            viewport.height,
            viewport.scale_to_fit
        );
    }
}

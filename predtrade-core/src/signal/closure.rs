use super::{SignalKind, SignalProvider};
use crate::domain::Bar;

/// Adapts any `Fn(&[Bar]) -> f64` into a [`SignalProvider`].
///
/// This is how an externally loaded model is plugged into the engine.
pub struct FnProvider<F> {
    name: String,
    window_size: usize,
    kind: SignalKind,
    predict: F,
}

impl<F> FnProvider<F>
where
    F: Fn(&[Bar]) -> f64 + Send + Sync,
{
    pub fn new(name: impl Into<String>, window_size: usize, kind: SignalKind, predict: F) -> Self {
        Self {
            name: name.into(),
            window_size,
            kind,
            predict,
        }
    }
}

impl<F> SignalProvider for FnProvider<F>
where
    F: Fn(&[Bar]) -> f64 + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn window_size(&self) -> usize {
        self.window_size
    }

    fn kind(&self) -> SignalKind {
        self.kind
    }

    fn predict(&self, window: &[Bar]) -> f64 {
        (self.predict)(window)
    }
}

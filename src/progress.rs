//! Informe de progreso como observador inyectado.
//!
//! El núcleo sólo avanza de uno en uno; la presentación (barra de consola o
//! nada) la decide quien construye el `ProgressSink`.

use indicatif::{ProgressBar, ProgressStyle};

/// Una fase con total conocido que avanza de uno en uno.
pub trait Progress: Send + Sync {
    fn advance(&self);

    fn finish(&self) {}
}

/// Abre fases de progreso.
pub trait ProgressSink: Send + Sync {
    fn begin(&self, label: &str, total: u64) -> Box<dyn Progress>;
}

const BAR_TEMPLATE: &str = "Lilith - INFO - {msg}: {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed_precise}<{eta_precise}]";

/// Barras de `indicatif` en la consola.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn begin(&self, label: &str, total: u64) -> Box<dyn Progress> {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏ ");
        bar.set_style(style);
        bar.set_message(label.to_string());
        Box::new(bar)
    }
}

impl Progress for ProgressBar {
    fn advance(&self) {
        self.inc(1);
    }

    fn finish(&self) {
        ProgressBar::finish(self);
    }
}

/// Descarta todos los avances.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin(&self, _label: &str, _total: u64) -> Box<dyn Progress> {
        Box::new(NoProgress)
    }
}

impl Progress for NoProgress {
    fn advance(&self) {}
}

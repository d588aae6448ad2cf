pub mod layout;
pub mod pdf;

pub use pdf::render_report;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("PDF font error: {0}")]
    Font(String),
    #[error("PDF save error: {0}")]
    Save(String),
}

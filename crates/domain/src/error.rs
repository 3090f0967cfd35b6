/// Shared error type used across all botgate crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("adapter {adapter}: {message}")]
    Adapter { adapter: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

use anyhow::Result;

/// The monitor runs one cooperative polling loop, so the daemon never needs
/// more than a current thread runtime.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

//! Common result and error types shared by the plinth crates.

/// A boxed, thread-safe error used at user-code boundaries.
///
/// Makers and pluggable collaborators return this type so that they can
/// surface any error (I/O, parse, process, or an engine error raised while
/// reading a dependency) without the engine knowing its concrete type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    fn fails() -> Result<(), BoxError> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "boom").into())
    }

    #[test]
    fn boxes_io_errors() {
        let err = fails().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn boxes_strings() {
        let err: BoxError = "plain message".into();
        assert_eq!(format!("{err}"), "plain message");
    }
}

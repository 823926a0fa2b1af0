//! Result type alias for the ingestion engine

use super::errors::IngestError;

/// Result type alias for ingestion operations
///
/// # Examples
///
/// ```
/// use scholarly_ingest::domain::result::Result;
/// use scholarly_ingest::domain::errors::IngestError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(IngestError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(IngestError::Validation("test error".to_string()));
        assert!(result.is_err());
    }
}

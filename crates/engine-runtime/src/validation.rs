use crate::error::ValidationError;
use model::execution::request::SubmitRequest;

const DISALLOWED_KEYWORDS: [&str; 7] = [
    "drop", "delete", "insert", "update", "truncate", "alter", "create",
];

/// Checks that `sql` is a read-only SELECT. Disallowed keywords are matched
/// anywhere in the text, identifiers included: `created_at` is rejected.
pub fn validate_sql(sql: &str) -> Result<(), ValidationError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptySql);
    }

    let lowered = trimmed.to_lowercase();
    if !lowered.starts_with("select") {
        return Err(ValidationError::NotSelect);
    }

    let disallowed = DISALLOWED_KEYWORDS
        .iter()
        .find(|keyword| lowered.contains(*keyword));
    if let Some(word) = disallowed {
        return Err(ValidationError::DisallowedKeyword(word.to_uppercase()));
    }
    Ok(())
}

/// Shape checks that need no registry access.
pub fn validate_request(request: &SubmitRequest) -> Result<(), ValidationError> {
    validate_sql(&request.sql)?;
    if request.cluster_ids.is_empty() {
        return Err(ValidationError::NoClusters);
    }
    if request.user_id.trim().is_empty() {
        return Err(ValidationError::EmptyUserId);
    }
    Ok(())
}

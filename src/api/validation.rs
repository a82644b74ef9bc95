//! Presence checks for manual send requests.

use crate::notifications::mailer::parse_address;
use crate::notifications::EmailRequest;

use super::error::ApiError;

/// Maximum length accepted for any single text field
const MAX_FIELD_LENGTH: usize = 20_000;

/// Validate a recipient address
pub fn validate_recipient(field: &str, address: &str) -> Result<(), ApiError> {
    if address.trim().is_empty() {
        return Err(ApiError::validation_field(field, format!("{} is required", field)));
    }
    parse_address(address)
        .map(|_| ())
        .map_err(|e| ApiError::validation_field(field, e.to_string()))
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation_field(field, format!("{} is required", field)));
    }
    if value.len() > MAX_FIELD_LENGTH {
        return Err(ApiError::validation_field(
            field,
            format!("{} is too long (max {} characters)", field, MAX_FIELD_LENGTH),
        ));
    }
    Ok(())
}

/// Check the fields each template cannot render without
pub fn validate_email_request(request: &EmailRequest) -> Result<(), ApiError> {
    match request {
        EmailRequest::Welcome(data) => validate_recipient("email", &data.email),
        EmailRequest::ApplicationConfirmation(data) => {
            validate_recipient("applicant_email", &data.applicant_email)?;
            require("job_title", &data.job_title)
        }
        EmailRequest::ApplicationNotification(data) => {
            validate_recipient("employer_email", &data.employer_email)?;
            require("job_title", &data.job_title)?;
            if let Some(cover_letter) = data.cover_letter.as_deref() {
                if cover_letter.len() > MAX_FIELD_LENGTH {
                    return Err(ApiError::validation_field(
                        "cover_letter",
                        "cover_letter is too long",
                    ));
                }
            }
            Ok(())
        }
        EmailRequest::JobPosted(data) => {
            validate_recipient("employer_email", &data.employer_email)?;
            require("job_title", &data.job_title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{ApplicationConfirmationData, UserRole, WelcomeData};

    #[test]
    fn test_validate_recipient() {
        assert!(validate_recipient("to", "ada@example.com").is_ok());
        assert!(validate_recipient("to", "").is_err());
        assert!(validate_recipient("to", "ada").is_err());
    }

    #[test]
    fn test_validate_email_request() {
        let welcome = EmailRequest::Welcome(WelcomeData {
            email: "ada@example.com".to_string(),
            full_name: None,
            role: UserRole::JobSeeker,
        });
        assert!(validate_email_request(&welcome).is_ok());

        let blank_title = EmailRequest::ApplicationConfirmation(ApplicationConfirmationData {
            applicant_email: "ada@example.com".to_string(),
            applicant_name: None,
            job_title: "  ".to_string(),
            company_name: None,
        });
        let err = validate_email_request(&blank_title).unwrap_err();
        assert_eq!(err.to_string(), "[validation_error] job_title is required");
    }
}

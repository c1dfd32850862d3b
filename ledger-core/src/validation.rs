//! Input validation for published content

use crate::error::{Error, Result, TopicError};
use crate::types::Attachment;

/// Shortest accepted topic, in bytes
pub const MINIMUM_TOPIC_LENGTH: usize = 1;

/// Longest accepted topic, in bytes
pub const MAXIMUM_TOPIC_LENGTH: usize = 100;

/// Smallest accepted attachment, in bytes
pub const MINIMUM_CONTENT_LENGTH: u64 = 1;

/// `application/pdf`
pub const MIME_APPLICATION_PDF: &str = "application/pdf";
/// `image/jpeg`
pub const MIME_IMAGE_JPEG: &str = "image/jpeg";
/// `image/gif`
pub const MIME_IMAGE_GIF: &str = "image/gif";
/// `image/jpg`
pub const MIME_IMAGE_JPG: &str = "image/jpg";
/// `image/png`
pub const MIME_IMAGE_PNG: &str = "image/png";
/// `image/svg+xml`
pub const MIME_IMAGE_SVG: &str = "image/svg+xml";
/// `image/webp`
pub const MIME_IMAGE_WEBP: &str = "image/webp";
/// `text/plain`
pub const MIME_TEXT_PLAIN: &str = "text/plain";
/// `text/markdown`
pub const MIME_TEXT_MARKDOWN: &str = "text/markdown";

const ACCEPTED_MIMES: &[&str] = &[
    MIME_APPLICATION_PDF,
    MIME_IMAGE_JPEG,
    MIME_IMAGE_GIF,
    MIME_IMAGE_JPG,
    MIME_IMAGE_PNG,
    MIME_IMAGE_SVG,
    MIME_IMAGE_WEBP,
    MIME_TEXT_PLAIN,
    MIME_TEXT_MARKDOWN,
];

/// Check topic length bounds and that it fits on one line
pub fn validate_topic(topic: &str) -> Result<()> {
    let length = topic.len();
    if length < MINIMUM_TOPIC_LENGTH {
        return Err(TopicError::TooShort.into());
    }
    if length > MAXIMUM_TOPIC_LENGTH {
        return Err(TopicError::TooLong.into());
    }
    if topic.contains(['\n', '\r']) {
        return Err(TopicError::Multiline.into());
    }
    Ok(())
}

/// Check a MIME type is one the platform renders
pub fn validate_mime(mime: &str) -> Result<()> {
    if ACCEPTED_MIMES.contains(&mime) {
        Ok(())
    } else {
        Err(Error::MimeUnrecognized(mime.to_string()))
    }
}

/// Validate the attachments of a message and return their total cost
pub fn validate_attachments(attachments: &[Attachment]) -> Result<u64> {
    if attachments.is_empty() {
        return Err(Error::ContentTooShort);
    }
    let mut cost: u64 = 0;
    for attachment in attachments {
        validate_mime(&attachment.mime)?;
        if attachment.size < MINIMUM_CONTENT_LENGTH {
            return Err(Error::ContentTooShort);
        }
        cost = cost
            .checked_add(attachment.size)
            .ok_or(Error::AmountOverflow)?;
    }
    Ok(cost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_topic() {
        assert!(validate_topic("FooBar").is_ok());
        assert!(matches!(
            validate_topic(""),
            Err(Error::InvalidTopic(TopicError::TooShort))
        ));
        assert!(validate_topic(&"x".repeat(MAXIMUM_TOPIC_LENGTH)).is_ok());
        assert!(matches!(
            validate_topic(&"x".repeat(MAXIMUM_TOPIC_LENGTH + 1)),
            Err(Error::InvalidTopic(TopicError::TooLong))
        ));
        assert!(matches!(
            validate_topic("Foo\nBar"),
            Err(Error::InvalidTopic(TopicError::Multiline))
        ));
    }

    #[test]
    fn test_validate_mime() {
        assert!(validate_mime(MIME_TEXT_MARKDOWN).is_ok());
        assert!(validate_mime(MIME_IMAGE_WEBP).is_ok());
        assert!(matches!(
            validate_mime("application/x-msdownload"),
            Err(Error::MimeUnrecognized(_))
        ));
    }

    #[test]
    fn test_validate_attachments_sums_cost() {
        let attachments = vec![
            Attachment::new("a", MIME_TEXT_PLAIN, 12),
            Attachment::new("b", MIME_IMAGE_PNG, 30),
        ];
        assert_eq!(validate_attachments(&attachments).unwrap(), 42);
    }

    #[test]
    fn test_validate_attachments_rejects_empty() {
        assert!(matches!(validate_attachments(&[]), Err(Error::ContentTooShort)));
        assert!(matches!(
            validate_attachments(&[Attachment::new("a", MIME_TEXT_PLAIN, 0)]),
            Err(Error::ContentTooShort)
        ));
    }

    #[test]
    fn test_validate_attachments_overflow() {
        let attachments = vec![
            Attachment::new("a", MIME_TEXT_PLAIN, u64::MAX),
            Attachment::new("b", MIME_TEXT_PLAIN, 1),
        ];
        assert!(matches!(
            validate_attachments(&attachments),
            Err(Error::AmountOverflow)
        ));
    }
}

use quick_xml::{events::Event, Reader};

use crate::{FlexError, FlexResult};

/// Envelope returned by both Flex endpoints when they are not handing back a statement.
///
/// Only the first occurrence of each field is kept, wherever it sits in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlexResponse {
    pub status: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub reference_code: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Status,
    ErrorCode,
    ErrorMessage,
    ReferenceCode,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"Status" => Some(Field::Status),
            b"ErrorCode" => Some(Field::ErrorCode),
            b"ErrorMessage" => Some(Field::ErrorMessage),
            b"ReferenceCode" => Some(Field::ReferenceCode),
            _ => None,
        }
    }
}

impl FlexResponse {
    pub fn parse(xml: &str) -> FlexResult<Self> {
        let mut reader = Reader::from_str(xml);
        let mut response = FlexResponse::default();
        let mut current: Option<Field> = None;
        let mut text = String::new();
        let mut depth = 0usize;
        let mut saw_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    depth += 1;
                    saw_root = true;
                    current = Field::from_tag(e.local_name().as_ref());
                    text.clear();
                }
                Event::Empty(e) => {
                    saw_root = true;
                    if let Some(field) = Field::from_tag(e.local_name().as_ref()) {
                        response.set(field, String::new());
                    }
                }
                Event::Text(e) if current.is_some() => text.push_str(&e.unescape()?),
                Event::CData(e) if current.is_some() => {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if let Some(field) = current.take() {
                        response.set(field, std::mem::take(&mut text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(FlexError::Truncated { open: depth });
        }
        if !saw_root {
            return Err(FlexError::NoRoot);
        }
        Ok(response)
    }

    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Status => &mut self.status,
            Field::ErrorCode => &mut self.error_code,
            Field::ErrorMessage => &mut self.error_message,
            Field::ReferenceCode => &mut self.reference_code,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    pub fn is_success(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case("success"))
            .unwrap_or(false)
    }

    /// Trimmed, non-empty error message if the service sent one.
    pub fn message(&self) -> Option<&str> {
        self.error_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    pub fn code(&self) -> Option<&str> {
        self.error_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_envelope() {
        let xml = r#"<FlexStatementResponse timestamp="15 March, 2024 09:00 AM EDT">
<Status>Success</Status>
<ReferenceCode>1234567890</ReferenceCode>
<Url>https://gdcdyn.interactivebrokers.com/Universal/servlet/FlexStatementService.GetStatement</Url>
</FlexStatementResponse>"#;
        let parsed = FlexResponse::parse(xml).unwrap();
        assert!(parsed.is_success());
        assert_eq!(parsed.reference_code.as_deref(), Some("1234567890"));
        assert_eq!(parsed.message(), None);
    }

    #[test]
    fn parses_failure_envelope() {
        let xml = "<FlexStatementResponse><Status>Fail</Status><ErrorCode>1012</ErrorCode>\
                   <ErrorMessage>Token has expired.</ErrorMessage></FlexStatementResponse>";
        let parsed = FlexResponse::parse(xml).unwrap();
        assert!(!parsed.is_success());
        assert_eq!(parsed.code(), Some("1012"));
        assert_eq!(parsed.message(), Some("Token has expired."));
    }

    #[test]
    fn empty_elements_are_present_but_blank() {
        let xml = "<R><Status>success</Status><ErrorMessage/><ReferenceCode></ReferenceCode></R>";
        let parsed = FlexResponse::parse(xml).unwrap();
        assert!(parsed.is_success());
        assert_eq!(parsed.error_message.as_deref(), Some(""));
        assert_eq!(parsed.message(), None);
        assert_eq!(parsed.reference_code.as_deref(), Some(""));
    }

    #[test]
    fn unescapes_entities() {
        let xml = "<R><Status>Fail</Status><ErrorMessage>Query &amp; token mismatch</ErrorMessage></R>";
        let parsed = FlexResponse::parse(xml).unwrap();
        assert_eq!(parsed.message(), Some("Query & token mismatch"));
    }

    #[test]
    fn rejects_mismatched_tags() {
        assert!(FlexResponse::parse("<R><Status>Fail</R>").is_err());
    }

    #[test]
    fn rejects_truncated_envelope() {
        let xml = "<FlexStatementResponse><Status>Success</Status><ReferenceCode>123</ReferenceCode>";
        assert!(matches!(
            FlexResponse::parse(xml),
            Err(FlexError::Truncated { open: 1 })
        ));
    }

    #[test]
    fn rejects_body_without_root() {
        assert!(matches!(FlexResponse::parse(""), Err(FlexError::NoRoot)));
        assert!(matches!(
            FlexResponse::parse("Service temporarily unavailable"),
            Err(FlexError::NoRoot)
        ));
    }
}

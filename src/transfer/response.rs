//! Decoding of retrieved response documents.

use super::TransferError;
use crate::session::envelope;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub const RESPONSE_ROOT: &str = "cnpResponse";

/// Summary of a retrieved response file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDocument {
    pub path: PathBuf,
    pub version: Option<String>,
    pub response_code: Option<String>,
    pub message: Option<String>,
    pub session_id: Option<String>,
    /// `<batchResponse>` elements in the document.
    pub batch_responses: usize,
    /// `<RFRResponse>` elements in the document.
    pub rfr_responses: usize,
    pub body: String,
}

impl ResponseDocument {
    /// Processor accepted the request file as a whole.
    pub fn is_success(&self) -> bool {
        self.response_code.as_deref() == Some("0")
    }
}

#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, path: &Path) -> Result<ResponseDocument, TransferError>;
}

/// Reads the root element attributes and counts the response sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeParser;

impl EnvelopeParser {
    pub fn parse_text(&self, path: &Path, body: String) -> Result<ResponseDocument, TransferError> {
        let decode_err = |reason: String| TransferError::Decode {
            path: path.to_path_buf(),
            reason,
        };

        match envelope::root_name(&body) {
            Some(RESPONSE_ROOT) => {}
            Some(other) => {
                return Err(decode_err(format!(
                    "expected <{RESPONSE_ROOT}> root, found <{other}>"
                )))
            }
            None => return Err(decode_err("document has no root element".to_string())),
        }

        Ok(ResponseDocument {
            path: path.to_path_buf(),
            version: envelope::root_attribute(&body, "version"),
            response_code: envelope::root_attribute(&body, "response"),
            message: envelope::root_attribute(&body, "message"),
            session_id: envelope::root_attribute(&body, "cnpSessionId"),
            batch_responses: count_elements(&body, "batchResponse"),
            rfr_responses: count_elements(&body, "RFRResponse"),
            body,
        })
    }
}

#[async_trait]
impl DocumentParser for EnvelopeParser {
    async fn parse(&self, path: &Path) -> Result<ResponseDocument, TransferError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransferError::io(format!("read response {}", path.display()), e))?;
        let body = String::from_utf8(bytes).map_err(|_| TransferError::Decode {
            path: path.to_path_buf(),
            reason: "response is not valid UTF-8".to_string(),
        })?;
        self.parse_text(path, body)
    }
}

fn count_elements(body: &str, name: &str) -> usize {
    let open = format!("<{name}");
    body.match_indices(&open)
        .filter(|(at, _)| {
            matches!(
                body[at + open.len()..].chars().next(),
                Some(c) if c.is_whitespace() || c == '>' || c == '/'
            )
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cnpResponse version="12.33" xmlns="http://www.vantivcnp.com/schema" response="0" message="Valid Format" cnpSessionId="82821">
<batchResponse id="1" cnpBatchId="11" merchantId="101"><saleResponse/></batchResponse>
<batchResponse id="2" cnpBatchId="12" merchantId="101"/>
</cnpResponse>
"#;

    #[test]
    fn reads_root_attributes_and_counts_batches() {
        let doc = EnvelopeParser
            .parse_text(Path::new("r.xml"), SAMPLE.to_string())
            .unwrap();
        assert_eq!(doc.version.as_deref(), Some("12.33"));
        assert_eq!(doc.message.as_deref(), Some("Valid Format"));
        assert_eq!(doc.session_id.as_deref(), Some("82821"));
        assert_eq!(doc.batch_responses, 2);
        assert_eq!(doc.rfr_responses, 0);
        assert!(doc.is_success());
    }

    #[test]
    fn wrong_root_is_rejected() {
        let err = EnvelopeParser
            .parse_text(Path::new("r.xml"), "<cnpRequest/>".to_string())
            .unwrap_err();
        assert!(matches!(err, TransferError::Decode { .. }));
        assert!(err.to_string().contains("cnpRequest"));
    }

    #[test]
    fn empty_document_is_rejected() {
        let err = EnvelopeParser
            .parse_text(Path::new("r.xml"), String::new())
            .unwrap_err();
        assert!(err.to_string().contains("no root element"));
    }

    #[test]
    fn counts_rfr_responses_without_prefix_matches() {
        let body = concat!(
            r#"<cnpResponse response="0">"#,
            r#"<RFRResponse response="1" message="not ready"/><RFRResponseX/>"#,
            "</cnpResponse>"
        );
        let doc = EnvelopeParser
            .parse_text(Path::new("r.xml"), body.to_string())
            .unwrap();
        assert_eq!(doc.rfr_responses, 1);
    }

    #[tokio::test]
    async fn non_utf8_file_fails_to_decode() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.xml");
        tokio::fs::write(&path, [0xff, 0xfe, 0x00]).await.unwrap();
        let err = EnvelopeParser.parse(&path).await.unwrap_err();
        assert!(matches!(err, TransferError::Decode { .. }));
    }
}

//! Caller-supplied session content.

use super::envelope::{escape, inject_root_attribute};

const REPORT_GROUP_ATTR: &str = "reportGroup";

/// One serialized batch body contributed to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub body: String,
    pub report_group: Option<String>,
}

impl BatchItem {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            report_group: None,
        }
    }

    /// Report group stamped on the body's root element.
    ///
    /// A `reportGroup` already written into the body wins over this value,
    /// and over the session default.
    pub fn with_report_group(mut self, report_group: impl Into<String>) -> Self {
        self.report_group = Some(report_group.into());
        self
    }

    /// Fill the report group from `default` when the caller left it unset.
    pub(crate) fn apply_default_report_group(&mut self, default: &str) {
        if self.report_group.is_none() {
            self.report_group = Some(default.to_string());
        }
    }

    /// Body with the report group stamped on its root element.
    pub(crate) fn serialize(&self) -> String {
        let mut xml = match &self.report_group {
            Some(group) => inject_root_attribute(&self.body, REPORT_GROUP_ATTR, group),
            None => self.body.clone(),
        };
        if !xml.ends_with('\n') {
            xml.push('\n');
        }
        xml
    }
}

/// A "request for response" asking the processor to resend prior results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseRequest {
    /// Results of an earlier session, by processor session id.
    Session { cnp_session_id: u64 },
    /// Account updater results for a merchant and post day (`YYYY-MM-DD`).
    AccountUpdates {
        merchant_id: Option<String>,
        post_day: String,
    },
}

impl ResponseRequest {
    pub fn for_session(cnp_session_id: u64) -> Self {
        Self::Session { cnp_session_id }
    }

    pub(crate) fn serialize(&self, default_merchant_id: &str) -> String {
        match self {
            Self::Session { cnp_session_id } => format!(
                "<RFRRequest><cnpSessionId>{cnp_session_id}</cnpSessionId></RFRRequest>\n"
            ),
            Self::AccountUpdates {
                merchant_id,
                post_day,
            } => {
                let merchant = merchant_id.as_deref().unwrap_or(default_merchant_id);
                format!(
                    concat!(
                        "<RFRRequest><accountUpdateFileRequestData>",
                        "<merchantId>{}</merchantId><postDay>{}</postDay>",
                        "</accountUpdateFileRequestData></RFRRequest>\n",
                    ),
                    escape(merchant),
                    escape(post_day)
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_report_group_only_fills_missing() {
        let mut item = BatchItem::new("<A/>").with_report_group("mine");
        item.apply_default_report_group("RG1");
        assert_eq!(item.report_group.as_deref(), Some("mine"));

        let mut item = BatchItem::new("<A/>");
        item.apply_default_report_group("RG1");
        assert_eq!(item.serialize(), "<A reportGroup=\"RG1\"/>\n");
    }

    #[test]
    fn report_group_in_body_beats_explicit_value() {
        let item = BatchItem::new(r#"<batchRequest reportGroup="Y"/>"#).with_report_group("X");
        assert_eq!(item.serialize(), "<batchRequest reportGroup=\"Y\"/>\n");
    }

    #[test]
    fn session_rfr_serializes_id() {
        assert_eq!(
            ResponseRequest::for_session(42).serialize("m"),
            "<RFRRequest><cnpSessionId>42</cnpSessionId></RFRRequest>\n"
        );
    }

    #[test]
    fn account_update_rfr_falls_back_to_config_merchant() {
        let request = ResponseRequest::AccountUpdates {
            merchant_id: None,
            post_day: "2026-10-01".to_string(),
        };
        let xml = request.serialize("101");
        assert!(xml.contains("<merchantId>101</merchantId>"));
        assert!(xml.contains("<postDay>2026-10-01</postDay>"));
    }
}

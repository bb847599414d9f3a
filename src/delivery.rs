//! Outbound HTTP delivery for stream rules.
//!
//! A `rfc822` stream posts the raw transfer-syntax bytes untouched. An
//! `html` stream parses the message, pulls out its first `text/html` part
//! (transfer encodings decoded), and posts that together with metadata
//! headers: the message UID, the MIME-word-decoded subject, and the date in
//! both RFC 3339 and RFC 2822 form.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};
use mail_parser::{MessageParser, MimeHeaders};

use crate::error::DeliveryError;
use crate::mailbox::MessageBody;

/// Per-message delivery deadline bounding worst-case batch latency.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// What a stream rule posts: the raw message or its HTML part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamContent {
    Rfc822,
    Html,
}

impl StreamContent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rfc822" => Some(StreamContent::Rfc822),
            "html" => Some(StreamContent::Html),
            _ => None,
        }
    }
}

impl fmt::Display for StreamContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamContent::Rfc822 => "rfc822",
            StreamContent::Html => "html",
        })
    }
}

/// HTTP sink for one stream rule.
#[derive(Debug, Clone)]
pub struct Deliverer {
    http: reqwest::Client,
    timeout: Duration,
}

impl Deliverer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    /// Deliver one message to `target`. Failures are the caller's to
    /// isolate; this never retries.
    pub async fn deliver(
        &self,
        content: StreamContent,
        target: &str,
        message: &MessageBody,
    ) -> Result<(), DeliveryError> {
        match content {
            StreamContent::Rfc822 => self.post(target, message.raw.clone(), vec![]).await,
            StreamContent::Html => {
                let (html, meta) = extract_html(message)?;
                self.post(target, html, meta).await
            }
        }
    }

    async fn post(
        &self,
        target: &str,
        body: Vec<u8>,
        meta: Vec<(&'static str, String)>,
    ) -> Result<(), DeliveryError> {
        let mut req = self
            .http
            .post(target)
            .timeout(self.timeout)
            .header("Content-Type", "message/rfc822")
            .header("Accept", "application/json")
            .body(body);
        for (name, value) in meta {
            req = req.header(name, value);
        }

        let resp = req.send().await.map_err(|source| DeliveryError::Http {
            url: target.to_string(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                url: target.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Pull the first `text/html` part out of a message, plus the metadata
/// headers that accompany an html delivery.
fn extract_html(message: &MessageBody) -> Result<(Vec<u8>, Vec<(&'static str, String)>), DeliveryError> {
    let uid = message.uid;
    let parsed = MessageParser::default()
        .parse(&message.raw)
        .ok_or(DeliveryError::Unparseable { uid })?;

    match parsed.content_type() {
        Some(ct) if ct.ctype().eq_ignore_ascii_case("multipart") => {}
        other => {
            let found = other
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "text/plain".to_string());
            return Err(DeliveryError::NotMultipart { uid, found });
        }
    }

    // Parts are walked in order; `contents()` has transfer encodings
    // (base64, quoted-printable) already decoded, and a part with no
    // encoding header comes back as-is.
    let mut html = None;
    for part in &parsed.parts {
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype().eq_ignore_ascii_case("text")
            && ct.subtype().is_some_and(|sub| sub.eq_ignore_ascii_case("html"))
        {
            html = Some(part.contents().to_vec());
            break;
        }
    }
    let html = html.ok_or(DeliveryError::NoHtmlPart { uid })?;

    let date = parsed
        .date()
        .and_then(message_date)
        .ok_or(DeliveryError::MissingDate { uid })?;
    let subject = parsed.subject().unwrap_or_default().to_string();

    let meta = vec![
        ("X-Message-Uid", uid.to_string()),
        ("X-Message-Subject", subject),
        ("X-Message-Date-Rfc3339", date.to_rfc3339()),
        ("X-Message-Date-Rfc2822", date.to_rfc2822()),
    ];
    Ok((html, meta))
}

/// Convert a parsed Date header into a chrono datetime with its offset.
fn message_date(d: &mail_parser::DateTime) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDate::from_ymd_opt(i32::from(d.year), u32::from(d.month), u32::from(d.day))?
        .and_hms_opt(u32::from(d.hour), u32::from(d.minute), u32::from(d.second))?;
    let secs = i32::from(d.tz_hour) * 3600 + i32::from(d.tz_minute) * 60;
    let offset = if d.tz_before_gmt {
        FixedOffset::west_opt(secs)
    } else {
        FixedOffset::east_opt(secs)
    }?;
    naive.and_local_timezone(offset).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: sender@example.com\r\n\
        To: dest@example.com\r\n\
        Subject: =?utf-8?q?D=C3=A9cod=C3=A9?=\r\n\
        Date: Mon, 02 Mar 2020 15:04:05 +0100\r\n\
        Content-Type: multipart/alternative; boundary=\"b\"\r\n\
        \r\n\
        --b\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        plain body\r\n\
        --b\r\n\
        Content-Type: text/html\r\n\
        Content-Transfer-Encoding: base64\r\n\
        \r\n\
        PGI+aGVsbG88L2I+\r\n\
        --b--\r\n";

    const PLAIN: &str = "From: sender@example.com\r\n\
        Subject: just text\r\n\
        Date: Mon, 02 Mar 2020 15:04:05 +0100\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        no html here\r\n";

    const NO_HTML: &str = "From: sender@example.com\r\n\
        Subject: mixed\r\n\
        Date: Mon, 02 Mar 2020 15:04:05 +0100\r\n\
        Content-Type: multipart/mixed; boundary=\"b\"\r\n\
        \r\n\
        --b\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        only text\r\n\
        --b--\r\n";

    fn body(raw: &str) -> MessageBody {
        MessageBody {
            uid: 7,
            raw: raw.as_bytes().to_vec(),
        }
    }

    #[test]
    fn extracts_base64_html_part() {
        let (html, _) = extract_html(&body(MULTIPART)).unwrap();
        assert_eq!(String::from_utf8_lossy(&html), "<b>hello</b>");
    }

    #[test]
    fn metadata_headers_carry_uid_subject_and_dates() {
        let (_, meta) = extract_html(&body(MULTIPART)).unwrap();
        let get = |name: &str| {
            meta.iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.as_str())
                .unwrap_or_default()
        };
        assert_eq!(get("X-Message-Uid"), "7");
        assert_eq!(get("X-Message-Subject"), "Décodé");
        assert_eq!(get("X-Message-Date-Rfc3339"), "2020-03-02T15:04:05+01:00");
        assert_eq!(
            get("X-Message-Date-Rfc2822"),
            "Mon, 2 Mar 2020 15:04:05 +0100"
        );
    }

    #[test]
    fn non_multipart_message_is_rejected() {
        let err = extract_html(&body(PLAIN)).unwrap_err();
        assert!(matches!(err, DeliveryError::NotMultipart { uid: 7, .. }));
    }

    #[test]
    fn multipart_without_html_part_is_rejected() {
        let err = extract_html(&body(NO_HTML)).unwrap_err();
        assert!(matches!(err, DeliveryError::NoHtmlPart { uid: 7 }));
    }

    #[test]
    fn content_kind_names() {
        assert_eq!(StreamContent::from_name("html"), Some(StreamContent::Html));
        assert_eq!(
            StreamContent::from_name("rfc822"),
            Some(StreamContent::Rfc822)
        );
        assert_eq!(StreamContent::from_name("pdf"), None);
    }
}

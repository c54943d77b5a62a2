pub mod filters;
pub mod signature;

use std::sync::Arc;

use serde::Serialize;

use crate::calibrate::CalibrationData;
use crate::executor::ResponseSummary;
use crate::waf::{stock_server_label, SignatureLayer, WafDatabase};
use self::filters::FilterChain;
use self::signature::{normalize_body, response_signature, DuplicateCounts};

/// Response type tag carried on every result record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseKind {
    Ok,
    Waf,
    App,
    Sys,
    Red,
    Filtered,
}

#[derive(Clone, Debug)]
pub struct Classification {
    pub kind: ResponseKind,
    pub source_label: String,
    pub signature: String,
    pub keep: bool,
    pub drop_reason: Option<String>,
}

impl Classification {
    fn filtered(reason: &str, signature: String) -> Self {
        Self {
            kind: ResponseKind::Filtered,
            source_label: String::new(),
            signature,
            keep: false,
            drop_reason: Some(reason.to_string()),
        }
    }
}

/// Per-target classifier. Filters run in a fixed order; the first hit
/// drops the response. Classification itself never fails: anything the
/// tagger cannot place stays visible as APP.
pub struct Classifier {
    filters: FilterChain,
    calibration: CalibrationData,
    waf: Arc<WafDatabase>,
    duplicates: DuplicateCounts,
}

impl Classifier {
    pub fn new(
        filters: FilterChain,
        calibration: CalibrationData,
        waf: Arc<WafDatabase>,
        filter_threshold: u32,
    ) -> Self {
        Self {
            filters,
            calibration,
            waf,
            duplicates: DuplicateCounts::new(filter_threshold),
        }
    }

    pub fn classify(&self, path: &str, summary: &ResponseSummary) -> Classification {
        // Synthetic summaries from exhausted retries never surface.
        if summary.status == 0 {
            return Classification::filtered("transport", String::new());
        }

        if let Some(reason) = self.filters.excluded_early(path, summary) {
            return Classification::filtered(reason, String::new());
        }

        if self.calibration.matches(summary) {
            return Classification::filtered("wildcard", String::new());
        }

        if let Some(reason) = self.filters.excluded_late(summary) {
            return Classification::filtered(reason, String::new());
        }

        let normalized = normalize_body(&summary.text());
        let sig = response_signature(summary.status, summary.body_size, &normalized);
        if !self.duplicates.admit(&sig) {
            return Classification::filtered("threshold", sig);
        }

        let (kind, source_label) = self.tag(summary);
        Classification {
            kind,
            source_label,
            signature: sig,
            keep: true,
            drop_reason: None,
        }
    }

    fn tag(&self, summary: &ResponseSummary) -> (ResponseKind, String) {
        if (300..400).contains(&summary.status) {
            return (ResponseKind::Red, String::new());
        }
        if let Some(sig) = self.waf.detect(summary) {
            let kind = match sig.layer {
                SignatureLayer::Infra => ResponseKind::Waf,
                SignatureLayer::App => ResponseKind::App,
            };
            return (kind, sig.label.clone());
        }
        if let Some(label) = stock_server_label(summary) {
            return (ResponseKind::Sys, label.to_string());
        }
        if (200..300).contains(&summary.status) {
            return (ResponseKind::Ok, String::new());
        }
        (ResponseKind::App, "Backend".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::filters::FilterChainBuilder;
    use std::collections::HashMap;

    fn summary(status: u16, headers: &[(&str, &str)], body: &str) -> ResponseSummary {
        let mut map = HashMap::new();
        for (k, v) in headers {
            map.insert(k.to_string(), v.to_string());
        }
        ResponseSummary {
            status,
            body: body.as_bytes().to_vec(),
            body_size: body.len(),
            headers: map,
            final_url: "http://example.com/x".to_string(),
            redirect_chain: Vec::new(),
            elapsed_ms: 1,
            retry_count: 0,
        }
    }

    fn classifier(calibration: CalibrationData, threshold: u32) -> Classifier {
        Classifier::new(
            FilterChainBuilder::new().build(),
            calibration,
            Arc::new(WafDatabase::builtin()),
            threshold,
        )
    }

    #[test]
    fn transport_failures_are_dropped_silently() {
        let c = classifier(CalibrationData::empty(), 0);
        let cls = c.classify("a", &ResponseSummary::failed("http://example.com/a", 3));
        assert!(!cls.keep);
        assert_eq!(cls.drop_reason.as_deref(), Some("transport"));
    }

    #[test]
    fn calibrated_wildcards_are_filtered() {
        let soft404 = summary(200, &[], "Page not found");
        let mut calibration = CalibrationData::empty();
        calibration.trust_response(&soft404);

        let c = classifier(calibration, 0);
        let cls = c.classify("missing", &soft404);
        assert!(!cls.keep);
        assert_eq!(cls.drop_reason.as_deref(), Some("wildcard"));

        let real = summary(200, &[], &"<html>a very different admin panel page</html>".repeat(4));
        assert!(c.classify("admin", &real).keep);
    }

    #[test]
    fn duplicate_signatures_hit_the_threshold() {
        let c = classifier(CalibrationData::empty(), 3);
        let body = "same page every time";
        for _ in 0..3 {
            assert!(c.classify("a", &summary(200, &[], body)).keep);
        }
        let cls = c.classify("a", &summary(200, &[], body));
        assert!(!cls.keep);
        assert_eq!(cls.drop_reason.as_deref(), Some("threshold"));
        assert!(!cls.signature.is_empty());
    }

    #[test]
    fn cloudflare_block_is_waf_plain_nginx_backend_is_app() {
        let c = classifier(CalibrationData::empty(), 0);

        let blocked = summary(
            403,
            &[("server", "cloudflare")],
            "<title>Attention Required! | Cloudflare</title>",
        );
        let cls = c.classify("admin", &blocked);
        assert_eq!(cls.kind, ResponseKind::Waf);
        assert_eq!(cls.source_label, "Cloudflare WAF");

        let backend = summary(
            403,
            &[("server", "nginx")],
            "{\"error\": \"insufficient permissions\", \"code\": 1403}",
        );
        let cls = c.classify("admin", &backend);
        assert_eq!(cls.kind, ResponseKind::App);
        assert_eq!(cls.source_label, "Backend");
    }

    #[test]
    fn redirects_tag_red_and_stock_pages_tag_sys() {
        let c = classifier(CalibrationData::empty(), 0);

        let cls = c.classify("old", &summary(301, &[("location", "/new")], ""));
        assert_eq!(cls.kind, ResponseKind::Red);
        assert!(cls.source_label.is_empty());

        let stock = summary(
            404,
            &[("server", "nginx/1.24.0")],
            "<html><center><h1>404 Not Found</h1></center><hr><center>nginx</center></html>",
        );
        let cls = c.classify("gone", &stock);
        assert_eq!(cls.kind, ResponseKind::Sys);
        assert_eq!(cls.source_label, "Nginx Default");
    }

    #[test]
    fn plain_success_is_ok() {
        let c = classifier(CalibrationData::empty(), 0);
        let cls = c.classify("index.php", &summary(200, &[], "<html>welcome</html>"));
        assert!(cls.keep);
        assert_eq!(cls.kind, ResponseKind::Ok);
    }
}

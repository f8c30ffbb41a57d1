//! # Authority Responses
//!
//! Every call to the authority yields a status code (`cStat`) and a
//! human-readable reason (`xMotivo`), plus, depending on the phase, a
//! receipt number (`nRec`, asynchronous first phase) or a protocol number
//! (`nProt`, final authorization). A response is immutable once received;
//! every submission attempt produces its own response and all of them are
//! retained for audit.

use serde::{Deserialize, Serialize};

use nfe_xml::Element;

use crate::error::TransportError;

/// One immutable response from the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityResponse {
    /// The authority's numeric status code (`cStat`).
    pub status: u16,
    /// Human-readable reason (`xMotivo`).
    pub reason: String,
    /// Receipt number for the asynchronous follow-up poll (`nRec`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    /// Protocol number of a final authorization (`nProt`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Authority-side processing timestamp (`dhRecbto`), verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// The two shapes a batch submission reply can take.
///
/// The authority may answer synchronously with the final document result,
/// or hand back a receipt that must be polled. The client never hides
/// which of the two occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionReply {
    /// The final result arrived in the submission reply itself.
    Immediate(AuthorityResponse),
    /// The batch was received; the result must be polled with `receipt`.
    Receipt {
        /// The receipt number for `poll_receipt`.
        receipt: String,
        /// The batch-level response (`cStat` 103).
        response: AuthorityResponse,
    },
}

impl SubmissionReply {
    /// The response carried by either shape.
    pub fn response(&self) -> &AuthorityResponse {
        match self {
            Self::Immediate(response) => response,
            Self::Receipt { response, .. } => response,
        }
    }
}

/// Parse an authority return envelope.
///
/// When the reply embeds a document protocol (`infProt`), the document's
/// own result takes precedence over the batch container status; otherwise
/// the top-level `cStat`/`xMotivo` pair is the result.
pub fn parse_authority_response(
    endpoint: &str,
    xml: &str,
) -> Result<AuthorityResponse, TransportError> {
    let root = Element::parse(xml).map_err(|e| TransportError::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    let scope = root.find_first("infProt").unwrap_or(&root);

    let status_text = scope
        .find_first("cStat")
        .map(|e| e.text())
        .ok_or_else(|| TransportError::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: "response has no cStat".into(),
        })?;
    let status: u16 = status_text
        .trim()
        .parse()
        .map_err(|_| TransportError::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: format!("non-numeric cStat {status_text:?}"),
        })?;
    let reason = scope
        .find_first("xMotivo")
        .map(|e| e.text())
        .unwrap_or_default();

    Ok(AuthorityResponse {
        status,
        reason,
        receipt: root
            .find_first("infRec")
            .and_then(|r| r.find_first("nRec"))
            .map(|e| e.text()),
        protocol: scope.find_first("nProt").map(|e| e.text()),
        timestamp: scope.find_first("dhRecbto").map(|e| e.text()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_received_reply_parses_receipt() {
        let xml = concat!(
            r#"<retEnviNFe xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">"#,
            r#"<tpAmb>2</tpAmb><cStat>103</cStat><xMotivo>Lote recebido com sucesso</xMotivo>"#,
            r#"<infRec><nRec>331000012345678</nRec><tMed>1</tMed></infRec>"#,
            r#"</retEnviNFe>"#,
        );
        let response = parse_authority_response("test", xml).expect("parse");
        assert_eq!(response.status, 103);
        assert_eq!(response.receipt.as_deref(), Some("331000012345678"));
        assert!(response.protocol.is_none());
    }

    #[test]
    fn protocol_result_takes_precedence_over_container() {
        let xml = concat!(
            r#"<retConsReciNFe xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">"#,
            r#"<cStat>104</cStat><xMotivo>Lote processado</xMotivo>"#,
            r#"<protNFe versao="4.00"><infProt>"#,
            r#"<chNFe>33250114200166000187550010000000011000000017</chNFe>"#,
            r#"<dhRecbto>2025-01-15T10:31:02-03:00</dhRecbto>"#,
            r#"<nProt>333250000000001</nProt><cStat>100</cStat>"#,
            r#"<xMotivo>Autorizado o uso da NF-e</xMotivo>"#,
            r#"</infProt></protNFe>"#,
            r#"</retConsReciNFe>"#,
        );
        let response = parse_authority_response("test", xml).expect("parse");
        assert_eq!(response.status, 100);
        assert_eq!(response.protocol.as_deref(), Some("333250000000001"));
        assert_eq!(
            response.timestamp.as_deref(),
            Some("2025-01-15T10:31:02-03:00")
        );
    }

    #[test]
    fn heartbeat_reply_parses_status() {
        let xml = concat!(
            r#"<retConsStatServ xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">"#,
            r#"<cStat>107</cStat><xMotivo>Servico em Operacao</xMotivo>"#,
            r#"</retConsStatServ>"#,
        );
        let response = parse_authority_response("test", xml).expect("parse");
        assert_eq!(response.status, 107);
        assert!(response.receipt.is_none());
    }

    #[test]
    fn missing_cstat_is_malformed() {
        let err = parse_authority_response("test", "<retEnviNFe></retEnviNFe>").unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse { .. }));
    }

    #[test]
    fn non_xml_is_malformed() {
        let err = parse_authority_response("test", "<html>gateway error").unwrap_err();
        assert!(matches!(err, TransportError::MalformedResponse { .. }));
    }

    #[test]
    fn responses_inside_soap_envelope_parse() {
        let xml = concat!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>"#,
            r#"<nfeResultMsg xmlns="http://www.portalfiscal.inf.br/nfe/wsdl/NFeStatusServico4">"#,
            r#"<retConsStatServ xmlns="http://www.portalfiscal.inf.br/nfe">"#,
            r#"<cStat>107</cStat><xMotivo>Em operacao</xMotivo></retConsStatServ>"#,
            r#"</nfeResultMsg></soap:Body></soap:Envelope>"#,
        );
        let response = parse_authority_response("test", xml).expect("parse");
        assert_eq!(response.status, 107);
    }

    #[test]
    fn reply_accessor_returns_inner_response() {
        let inner = AuthorityResponse {
            status: 103,
            reason: "ok".into(),
            receipt: Some("r".into()),
            protocol: None,
            timestamp: None,
        };
        let reply = SubmissionReply::Receipt {
            receipt: "r".into(),
            response: inner.clone(),
        };
        assert_eq!(reply.response(), &inner);
    }
}

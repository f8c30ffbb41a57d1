//! # SOAP Envelopes
//!
//! Each authority operation is a SOAP 1.1 call with a fixed envelope
//! shape: the operation payload sits inside `nfeDadosMsg`, namespaced to
//! the operation's WSDL, and every call carries an operation-specific
//! `SOAPAction` header.

use nfe_core::AccessKey;
use nfe_xml::{CanonicalXml, XmlBuilder, XmlError, LAYOUT_VERSION, NFE_NAMESPACE};

use crate::batch::SubmissionBatch;

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const WSDL_BASE: &str = "http://www.portalfiscal.inf.br/nfe/wsdl";

/// A SOAP operation of the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoapOperation {
    /// WSDL service name (e.g. `NFeAutorizacao4`).
    pub service: &'static str,
    /// Method name inside the WSDL.
    pub method: &'static str,
}

impl SoapOperation {
    /// The namespace of this operation's WSDL.
    pub fn wsdl_namespace(&self) -> String {
        format!("{WSDL_BASE}/{}", self.service)
    }

    /// The `SOAPAction` header value.
    pub fn soap_action(&self) -> String {
        format!("{WSDL_BASE}/{}/{}", self.service, self.method)
    }
}

/// Batch submission.
pub const OP_AUTHORIZATION: SoapOperation = SoapOperation {
    service: "NFeAutorizacao4",
    method: "nfeAutorizacaoLote",
};

/// Receipt polling.
pub const OP_RECEIPT_POLL: SoapOperation = SoapOperation {
    service: "NFeRetAutorizacao4",
    method: "nfeRetAutorizacaoLote",
};

/// Protocol/status query by access key.
pub const OP_PROTOCOL_QUERY: SoapOperation = SoapOperation {
    service: "NFeConsultaProtocolo4",
    method: "nfeConsultaNF",
};

/// Event reception.
pub const OP_EVENT_RECEPTION: SoapOperation = SoapOperation {
    service: "NFeRecepcaoEvento4",
    method: "nfeRecepcaoEvento",
};

/// Service status (heartbeat).
pub const OP_STATUS_SERVICE: SoapOperation = SoapOperation {
    service: "NFeStatusServico4",
    method: "nfeStatusServicoNF",
};

/// Wrap an operation payload in the SOAP envelope.
pub fn envelope(operation: SoapOperation, payload: &CanonicalXml) -> Result<CanonicalXml, XmlError> {
    let wsdl_ns = operation.wsdl_namespace();
    let mut b = XmlBuilder::new();
    b.open_with_attrs("soapenv:Envelope", &[("xmlns:soapenv", SOAP_ENV_NS)]);
    b.open("soapenv:Body");
    b.open_with_attrs("nfeDadosMsg", &[("xmlns", wsdl_ns.as_str())]);
    b.fragment(payload);
    b.close();
    b.close();
    b.close();
    b.finish()
}

/// Build the `enviNFe` payload for a batch submission.
pub fn authorization_payload(batch: &SubmissionBatch) -> Result<CanonicalXml, XmlError> {
    let mut b = XmlBuilder::new();
    b.open_with_attrs(
        "enviNFe",
        &[("xmlns", NFE_NAMESPACE), ("versao", LAYOUT_VERSION)],
    );
    b.leaf("idLote", &batch.id.as_digits());
    b.leaf("indSinc", if batch.synchronous { "1" } else { "0" });
    for document in &batch.documents {
        b.raw(document);
    }
    b.close();
    b.finish()
}

/// Build the `consReciNFe` payload for a receipt poll.
pub fn receipt_poll_payload(
    environment_code: &str,
    receipt: &str,
) -> Result<CanonicalXml, XmlError> {
    let mut b = XmlBuilder::new();
    b.open_with_attrs(
        "consReciNFe",
        &[("xmlns", NFE_NAMESPACE), ("versao", LAYOUT_VERSION)],
    );
    b.leaf("tpAmb", environment_code);
    b.leaf("nRec", receipt);
    b.close();
    b.finish()
}

/// Build the `consSitNFe` payload for a protocol query.
pub fn protocol_query_payload(
    environment_code: &str,
    key: &AccessKey,
) -> Result<CanonicalXml, XmlError> {
    let mut b = XmlBuilder::new();
    b.open_with_attrs(
        "consSitNFe",
        &[("xmlns", NFE_NAMESPACE), ("versao", LAYOUT_VERSION)],
    );
    b.leaf("tpAmb", environment_code);
    b.leaf("xServ", "CONSULTAR");
    b.leaf("chNFe", key.as_str());
    b.close();
    b.finish()
}

/// Build the `envEvento` payload wrapping a signed event.
pub fn event_payload(lot_digits: &str, signed_event: &str) -> Result<CanonicalXml, XmlError> {
    let mut b = XmlBuilder::new();
    b.open_with_attrs("envEvento", &[("xmlns", NFE_NAMESPACE), ("versao", "1.00")]);
    b.leaf("idLote", lot_digits);
    b.raw(signed_event);
    b.close();
    b.finish()
}

/// Build the `consStatServ` payload for the heartbeat.
pub fn status_service_payload(
    environment_code: &str,
    state_digits: &str,
) -> Result<CanonicalXml, XmlError> {
    let mut b = XmlBuilder::new();
    b.open_with_attrs(
        "consStatServ",
        &[("xmlns", NFE_NAMESPACE), ("versao", LAYOUT_VERSION)],
    );
    b.leaf("tpAmb", environment_code);
    b.leaf("cUF", state_digits);
    b.leaf("xServ", "STATUS");
    b.close();
    b.finish()
}

//! # Canonical Document Assembler
//!
//! Maps a [`FiscalDocument`] to the exact element order and numeric
//! formatting of the authority's layout, producing a byte-stable fragment
//! ready for signing. The assembler is pure: no I/O, no side effects, and
//! two assemblies of an unchanged document are byte-identical.
//!
//! Conditional sub-blocks (optional tax groups, freight, payments,
//! free-text) are emitted only when the corresponding data is present;
//! absent-but-required fields fail with
//! [`ValidationError::MissingRequiredField`] before anything is written.

use nfe_core::{
    AccessKey, Environment, FiscalDocument, LineItem, RecipientTaxId, TaxGroup, ValidationError,
};

use crate::writer::{CanonicalXml, XmlBuilder};

/// Namespace of the fiscal document layout.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// Layout version emitted by this engine.
pub const LAYOUT_VERSION: &str = "4.00";

/// Identification of the emitting application (`verProc`).
const EMITTER_VERSION: &str = "nfe-engine/0.1";

/// Assemble the signable document for `doc` under the given access key.
///
/// The output is the full `NFe` element; the element to be signed is
/// `infNFe`, carrying `Id="NFe" + key`. The access key must have been
/// generated from this document's header fields.
pub fn assemble(doc: &FiscalDocument, key: &AccessKey) -> Result<CanonicalXml, ValidationError> {
    validate(doc)?;

    let id = key.element_id();
    let key_digits = key.as_str();
    // cNF and cDV are reproduced from the key so the rendered header can
    // never drift from the identifier derived from it.
    let random_code = &key_digits[35..43];
    let check_digit = &key_digits[43..44];

    let mut b = XmlBuilder::new();
    b.open_with_attrs("NFe", &[("xmlns", NFE_NAMESPACE)]);
    b.open_with_attrs("infNFe", &[("Id", id.as_str()), ("versao", LAYOUT_VERSION)]);

    // -- ide ------------------------------------------------------------
    b.open("ide");
    b.leaf("cUF", &doc.header.state.as_digits());
    b.leaf("cNF", random_code);
    b.leaf("natOp", &doc.header.operation_nature);
    b.leaf("mod", doc.header.model.code());
    b.leaf("serie", &doc.header.series.value().to_string());
    b.leaf("nNF", &doc.header.number.value().to_string());
    b.leaf("dhEmi", &doc.header.emitted_at.to_canonical_string());
    b.leaf("tpNF", "1");
    b.leaf("cMunFG", doc.header.municipality_code.as_str());
    b.leaf("tpEmis", doc.header.emission_type.code());
    b.leaf("cDV", check_digit);
    b.leaf("tpAmb", doc.header.environment.code());
    b.leaf("finNFe", doc.header.purpose.code());
    b.leaf("procEmi", "0");
    b.leaf("verProc", EMITTER_VERSION);
    b.close();

    // -- emit -----------------------------------------------------------
    b.open("emit");
    b.leaf("CNPJ", doc.issuer.cnpj.as_str());
    b.leaf("xNome", &doc.issuer.name);
    b.open("enderEmit");
    write_address(&mut b, &doc.issuer.address);
    b.close();
    b.leaf("IE", &doc.issuer.state_registration);
    b.leaf("CRT", &doc.issuer.tax_regime.to_string());
    b.close();

    // -- dest -----------------------------------------------------------
    b.open("dest");
    match &doc.recipient.tax_id {
        RecipientTaxId::Cnpj(cnpj) => b.leaf("CNPJ", cnpj.as_str()),
        RecipientTaxId::Cpf(cpf) => b.leaf("CPF", cpf.as_str()),
    };
    b.leaf("xNome", &doc.recipient.name);
    if let Some(addr) = &doc.recipient.address {
        b.open("enderDest");
        write_address(&mut b, addr);
        b.close();
    }
    b.close();

    // -- det ------------------------------------------------------------
    for (index, item) in doc.items.iter().enumerate() {
        let n_item = (index + 1).to_string();
        b.open_with_attrs("det", &[("nItem", n_item.as_str())]);
        b.open("prod");
        b.leaf("cProd", &item.product_code);
        b.leaf("xProd", &item.description);
        b.leaf("NCM", &item.ncm);
        b.leaf("CFOP", &item.cfop);
        b.leaf("uCom", &item.unit);
        b.leaf("qCom", &item.quantity.to_layout_string());
        b.leaf("vUnCom", &item.unit_value.to_layout_string());
        b.leaf("vProd", &item.total.to_layout_string());
        b.close();
        b.open("imposto");
        write_tax_group(&mut b, "ICMS", item.taxes.icms.as_ref());
        write_tax_group(&mut b, "PIS", item.taxes.pis.as_ref());
        write_tax_group(&mut b, "COFINS", item.taxes.cofins.as_ref());
        b.close();
        b.close();
    }

    // -- total ----------------------------------------------------------
    b.open("total");
    b.open("ICMSTot");
    b.leaf("vBC", &doc.totals.icms_base.to_layout_string());
    b.leaf("vICMS", &doc.totals.icms_value.to_layout_string());
    b.leaf("vProd", &doc.totals.products.to_layout_string());
    b.leaf("vPIS", &doc.totals.pis_value.to_layout_string());
    b.leaf("vCOFINS", &doc.totals.cofins_value.to_layout_string());
    b.leaf("vNF", &doc.totals.total.to_layout_string());
    b.close();
    b.close();

    // -- transp (conditional) -------------------------------------------
    if let Some(transport) = &doc.transport {
        b.open("transp");
        b.leaf("modFrete", &transport.freight_mode.to_string());
        if let Some(carrier) = &transport.carrier {
            b.open("transporta");
            b.leaf("CNPJ", carrier.cnpj.as_str());
            b.leaf("xNome", &carrier.name);
            b.close();
        }
        b.close();
    }

    // -- pag (conditional) ----------------------------------------------
    if !doc.payments.is_empty() {
        b.open("pag");
        for payment in &doc.payments {
            b.open("detPag");
            b.leaf("tPag", &payment.method);
            b.leaf("vPag", &payment.amount.to_layout_string());
            b.close();
        }
        b.close();
    }

    // -- infAdic (conditional) ------------------------------------------
    if let Some(info) = &doc.additional_info {
        b.open("infAdic");
        b.leaf("infCpl", info);
        b.close();
    }

    b.close(); // infNFe
    b.close(); // NFe

    b.finish().map_err(|e| {
        // The builder is driven entirely by this function; an unbalanced
        // stack here is a programming error surfaced as a field error on
        // the envelope.
        ValidationError::invalid("NFe", e.to_string())
    })
}

fn write_address(b: &mut XmlBuilder, addr: &nfe_core::Address) {
    b.leaf("xLgr", &addr.street);
    b.leaf("nro", &addr.number);
    b.leaf("xBairro", &addr.district);
    b.leaf("cMun", addr.municipality_code.as_str());
    b.leaf("xMun", &addr.municipality_name);
    b.leaf("UF", &addr.uf);
    b.leaf("CEP", &addr.postal_code);
}

fn write_tax_group(b: &mut XmlBuilder, name: &'static str, group: Option<&TaxGroup>) {
    if let Some(g) = group {
        b.open(name);
        b.leaf("CST", &g.situation_code);
        b.leaf("vBC", &g.base.to_layout_string());
        match name {
            "ICMS" => b.leaf("vICMS", &g.value.to_layout_string()),
            "PIS" => b.leaf("vPIS", &g.value.to_layout_string()),
            _ => b.leaf("vCOFINS", &g.value.to_layout_string()),
        };
        b.close();
    }
}

fn validate(doc: &FiscalDocument) -> Result<(), ValidationError> {
    fn required(
        element: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingRequiredField { element, field });
        }
        Ok(())
    }
    fn digits(
        field: &'static str,
        value: &str,
        width: usize,
    ) -> Result<(), ValidationError> {
        if value.len() != width || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::invalid(
                field,
                format!("expected {width} digits, got {:?}", value),
            ));
        }
        Ok(())
    }

    required("ide", "natOp", &doc.header.operation_nature)?;
    required("emit", "xNome", &doc.issuer.name)?;
    required("emit", "IE", &doc.issuer.state_registration)?;
    required("dest", "xNome", &doc.recipient.name)?;
    if doc.items.is_empty() {
        return Err(ValidationError::MissingRequiredField {
            element: "infNFe",
            field: "det",
        });
    }
    for item in &doc.items {
        validate_item(item)?;
        digits("NCM", &item.ncm, 8)?;
        digits("CFOP", &item.cfop, 4)?;
    }
    digits("CEP", &doc.issuer.address.postal_code, 8)?;
    Ok(())
}

fn validate_item(item: &LineItem) -> Result<(), ValidationError> {
    if item.product_code.trim().is_empty() {
        return Err(ValidationError::MissingRequiredField {
            element: "prod",
            field: "cProd",
        });
    }
    if item.description.trim().is_empty() {
        return Err(ValidationError::MissingRequiredField {
            element: "prod",
            field: "xProd",
        });
    }
    if item.unit.trim().is_empty() {
        return Err(ValidationError::MissingRequiredField {
            element: "prod",
            field: "uCom",
        });
    }
    Ok(())
}

/// The fields of an event-based contingency pre-authorization event.
#[derive(Debug, Clone)]
pub struct EpecEvent {
    /// Access key of the document awaiting reconciliation.
    pub access_key: AccessKey,
    /// Issuer CNPJ.
    pub issuer_cnpj: String,
    /// Target environment.
    pub environment: Environment,
    /// Event timestamp in canonical form.
    pub registered_at: String,
    /// Document grand total in layout form.
    pub total: String,
    /// Sequence of this event for the key (1 for the first registration).
    pub sequence: u8,
}

/// Event type code for the pre-authorization contingency event.
pub const EPEC_EVENT_TYPE: &str = "110140";

impl EpecEvent {
    /// The `Id` attribute of the signable `infEvento` element:
    /// `"ID"` + event type + access key + 2-digit sequence.
    pub fn element_id(&self) -> String {
        format!(
            "ID{}{}{:02}",
            EPEC_EVENT_TYPE,
            self.access_key.as_str(),
            self.sequence
        )
    }
}

/// Assemble the signable pre-authorization event for a document emitted
/// in event-based contingency.
///
/// The element to be signed is `infEvento`, carrying
/// `Id = "ID" + event type + access key + 2-digit sequence`.
pub fn assemble_epec_event(event: &EpecEvent) -> Result<CanonicalXml, ValidationError> {
    if event.sequence == 0 || event.sequence > 20 {
        return Err(ValidationError::invalid(
            "nSeqEvento",
            format!("expected 1..=20, got {}", event.sequence),
        ));
    }
    let id = event.element_id();

    let mut b = XmlBuilder::new();
    b.open_with_attrs("evento", &[("xmlns", NFE_NAMESPACE), ("versao", "1.00")]);
    b.open_with_attrs("infEvento", &[("Id", id.as_str())]);
    b.leaf("cOrgao", "91"); // contingency events are registered with the national environment
    b.leaf("tpAmb", event.environment.code());
    b.leaf("CNPJ", &event.issuer_cnpj);
    b.leaf("chNFe", event.access_key.as_str());
    b.leaf("dhEvento", &event.registered_at);
    b.leaf("tpEvento", EPEC_EVENT_TYPE);
    b.leaf("nSeqEvento", &event.sequence.to_string());
    b.leaf("verEvento", "1.00");
    b.open_with_attrs("detEvento", &[("versao", "1.00")]);
    b.leaf("descEvento", "EPEC");
    b.leaf("vNF", &event.total);
    b.close();
    b.close(); // infEvento
    b.close(); // evento

    b.finish()
        .map_err(|e| ValidationError::invalid("evento", e.to_string()))
}

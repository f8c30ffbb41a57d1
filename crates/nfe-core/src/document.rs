//! # Fiscal Document Model
//!
//! The in-memory model of a tax invoice as handed to the emission engine:
//! header, ordered line items with pre-computed tax sub-totals, aggregate
//! totals, and the optional transport/payment/free-text blocks.
//!
//! Tax amounts arrive already computed; this engine never derives them.
//! The model is plain data with serde derives; all protocol behavior lives
//! in the assembler, signature engine, and orchestrator.

use serde::{Deserialize, Serialize};

use crate::access_key::AccessKeyFields;
use crate::identity::{Cnpj, Cpf, DocNumber, MunicipalityCode, Series, StateCode};
use crate::money::{Amount, Quantity};
use crate::temporal::EmissionTimestamp;

/// Target environment of an emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    /// Production: documents have legal effect.
    Production,
    /// Homologation: the authority's test environment.
    Homologation,
}

impl Environment {
    /// The `tpAmb` layout code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Production => "1",
            Self::Homologation => "2",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => f.write_str("production"),
            Self::Homologation => f.write_str("homologation"),
        }
    }
}

/// Document model (`mod` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentModel {
    /// NF-e, model 55.
    Nfe,
    /// NFC-e, model 65 (consumer-facing).
    Nfce,
}

impl DocumentModel {
    /// The 2-digit layout code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Nfe => "55",
            Self::Nfce => "65",
        }
    }
}

/// Emission type (`tpEmis` field).
///
/// Only the modes this engine drives are modeled; the orchestrator picks
/// between [`Normal`](Self::Normal) and the contingency variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmissionType {
    /// Normal online emission.
    Normal,
    /// Event-based contingency: a pre-authorization event is registered
    /// while the full document awaits reconciliation.
    Epec,
    /// Local contingency: the signed document is stored and resent whole
    /// once the authority is reachable.
    FsDa,
}

impl EmissionType {
    /// The 1-digit layout code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Normal => "1",
            Self::Epec => "4",
            Self::FsDa => "5",
        }
    }
}

/// Purpose of the emission (`finNFe`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurposeCode {
    /// Regular sale.
    Normal,
    /// Complementary document.
    Complementary,
    /// Adjustment document.
    Adjustment,
    /// Goods return.
    GoodsReturn,
}

impl PurposeCode {
    /// The 1-digit layout code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Normal => "1",
            Self::Complementary => "2",
            Self::Adjustment => "3",
            Self::GoodsReturn => "4",
        }
    }
}

/// The issuing company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issuer {
    /// Issuer CNPJ.
    pub cnpj: Cnpj,
    /// Corporate name (`xNome`).
    pub name: String,
    /// State registration (`IE`), digits only.
    pub state_registration: String,
    /// Issuer address.
    pub address: Address,
    /// Tax regime code (`CRT`): 1 simples, 3 normal.
    pub tax_regime: u8,
}

/// The document recipient. Either a company or a natural person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    /// Federal tax id.
    pub tax_id: RecipientTaxId,
    /// Name (`xNome`).
    pub name: String,
    /// Recipient address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// Federal tax id of a recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecipientTaxId {
    /// Legal entity.
    Cnpj(Cnpj),
    /// Natural person.
    Cpf(Cpf),
}

/// A postal address in the layout's fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    /// Street (`xLgr`).
    pub street: String,
    /// Number (`nro`).
    pub number: String,
    /// District (`xBairro`).
    pub district: String,
    /// IBGE municipality code (`cMun`).
    pub municipality_code: MunicipalityCode,
    /// Municipality name (`xMun`).
    pub municipality_name: String,
    /// Federation unit (`UF`), two-letter abbreviation.
    pub uf: String,
    /// Postal code (`CEP`), 8 digits.
    pub postal_code: String,
}

/// A pre-computed tax sub-total attached to a line item.
///
/// The engine consumes these as given; no rule evaluation happens here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxGroup {
    /// Situation code within the group (`CST`/`CSOSN`).
    pub situation_code: String,
    /// Calculation base.
    pub base: Amount,
    /// Tax value.
    pub value: Amount,
}

/// Per-line tax sub-totals, present only for the groups that apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineTaxes {
    /// ICMS sub-total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icms: Option<TaxGroup>,
    /// PIS sub-total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pis: Option<TaxGroup>,
    /// COFINS sub-total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cofins: Option<TaxGroup>,
}

/// One line item of the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// Issuer's product code (`cProd`).
    pub product_code: String,
    /// Description (`xProd`).
    pub description: String,
    /// Mercosur classification (`NCM`), 8 digits.
    pub ncm: String,
    /// Operation nature code (`CFOP`), 4 digits.
    pub cfop: String,
    /// Commercial unit (`uCom`).
    pub unit: String,
    /// Commercial quantity (`qCom`).
    pub quantity: Quantity,
    /// Unit value in centavos (`vUnCom`).
    pub unit_value: Amount,
    /// Line total (`vProd`).
    pub total: Amount,
    /// Pre-computed tax sub-totals.
    pub taxes: LineTaxes,
}

/// Aggregate totals (`ICMSTot`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTotals {
    /// ICMS calculation base.
    pub icms_base: Amount,
    /// Total ICMS.
    pub icms_value: Amount,
    /// Total of products.
    pub products: Amount,
    /// Total PIS.
    pub pis_value: Amount,
    /// Total COFINS.
    pub cofins_value: Amount,
    /// Document grand total (`vNF`).
    pub total: Amount,
}

/// Optional freight block (`transp`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportBlock {
    /// Freight responsibility (`modFrete`): 0..=4, 9 for none.
    pub freight_mode: u8,
    /// Carrier, when contracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<Carrier>,
}

/// A freight carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Carrier {
    /// Carrier CNPJ.
    pub cnpj: Cnpj,
    /// Carrier name.
    pub name: String,
}

/// A payment entry (`detPag`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Payment method code (`tPag`), 2 digits (e.g. `01` cash).
    pub method: String,
    /// Paid amount.
    pub amount: Amount,
}

/// The document header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentHeader {
    /// Issuing state.
    pub state: StateCode,
    /// Operation nature, free text (`natOp`).
    pub operation_nature: String,
    /// Document model.
    pub model: DocumentModel,
    /// Series.
    pub series: Series,
    /// Sequential number.
    pub number: DocNumber,
    /// Emission timestamp with the issuer's UTC offset.
    pub emitted_at: EmissionTimestamp,
    /// Emission type.
    pub emission_type: EmissionType,
    /// Purpose code.
    pub purpose: PurposeCode,
    /// Municipality where the taxable event occurs (`cMunFG`).
    pub municipality_code: MunicipalityCode,
    /// Target environment.
    pub environment: Environment,
}

/// A complete, tax-calculated fiscal document as handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalDocument {
    /// Header fields.
    pub header: DocumentHeader,
    /// The issuing company.
    pub issuer: Issuer,
    /// The recipient.
    pub recipient: Recipient,
    /// Ordered line items. Must be non-empty.
    pub items: Vec<LineItem>,
    /// Aggregate totals.
    pub totals: DocumentTotals,
    /// Optional freight block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportBlock>,
    /// Payment entries; empty means the block is omitted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payments: Vec<Payment>,
    /// Free-text additional information (`infAdic/infCpl`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

impl FiscalDocument {
    /// Assemble the access-key fields for this document with the given
    /// 8-digit control code. Width validation happens when the key is
    /// generated from the returned fields.
    pub fn access_key_fields(&self, random_code: &str) -> AccessKeyFields {
        AccessKeyFields {
            state: self.header.state.as_digits(),
            year_month: self.header.emitted_at.year_month_digits(),
            issuer: self.issuer.cnpj.as_str().to_string(),
            model: self.header.model.code().to_string(),
            series: self.header.series.as_digits(),
            number: self.header.number.as_digits(),
            emission_type: self.header.emission_type.code().to_string(),
            random_code: random_code.to_string(),
        }
    }
}

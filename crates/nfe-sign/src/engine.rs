//! # Enveloped Signature Engine
//!
//! Produces and verifies enveloped XML digital signatures over a
//! designated element of a canonical document.
//!
//! The algorithm suite is fixed and never varies per call: exclusive
//! canonicalization, SHA-256 digests, RSA-SHA256 signatures. The
//! signature block is inserted as the last child of the signed element's
//! parent, referencing the element by its `Id` attribute.
//!
//! ## Security Invariant
//!
//! Signing input is `&CanonicalXml`: only bytes produced by the canonical
//! writer or canonicalizer can be signed. Verification recomputes the
//! digest over the canonicalized referenced element, so any mutation of
//! that element's content after signing invalidates the signature, while
//! bytes outside it (comments, siblings) do not participate.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use rsa::Pkcs1v15Sign;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use nfe_xml::{canonicalize, C14nOptions, CanonicalXml, Element, Node, XmlBuilder, XMLDSIG_NS};

use crate::capability::SigningCapability;
use crate::certificate::public_key_from_material;
use crate::error::SignError;

/// Algorithm identifier: exclusive canonicalization.
pub const ALGO_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
/// Algorithm identifier: enveloped-signature transform.
pub const ALGO_ENVELOPED: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
/// Algorithm identifier: RSA-SHA256.
pub const ALGO_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
/// Algorithm identifier: SHA-256 digests.
pub const ALGO_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// A signed document: the canonical XML with its enveloped signature,
/// plus the signature facts retained for audit and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// The full signed document.
    xml: String,
    /// `Id` of the signed element.
    element_id: String,
    /// Base64 digest of the canonicalized signed element.
    digest: String,
    /// Base64 RSA-SHA256 signature over the canonicalized `SignedInfo`.
    signature: String,
    /// Base64 key material embedded in `KeyInfo`.
    certificate: String,
}

impl SignedEnvelope {
    /// The full signed document.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// `Id` of the signed element.
    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    /// Base64 digest value.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Base64 signature value.
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// Sign the element identified by `element_id` inside `xml`.
///
/// Canonicalizes the element (enveloped-signature transform applied),
/// digests it, signs the `SignedInfo` through `capability`, and inserts
/// the signature block as the last child of the element's parent.
pub fn sign(
    xml: &CanonicalXml,
    element_id: &str,
    capability: &dyn SigningCapability,
) -> Result<SignedEnvelope, SignError> {
    if element_id.is_empty() {
        return Err(SignError::MissingIdAttribute {
            element: "(unspecified)".into(),
        });
    }

    let mut root = Element::parse(xml.as_str())?;
    let (target, target_ns) =
        root.find_by_id_scoped(element_id)
            .ok_or_else(|| SignError::ElementNotFound {
                id: element_id.to_string(),
            })?;

    let certificate = capability.certificate();
    if !certificate.is_valid_at(Utc::now()) {
        return Err(SignError::SigningKeyUnavailable {
            reason: format!(
                "certificate {} outside validity window ({} to {})",
                certificate.subject(),
                certificate.not_before(),
                certificate.not_after()
            ),
        });
    }

    // Digest over the canonicalized target, signatures stripped.
    let digested = canonicalize(
        target,
        &target_ns,
        C14nOptions {
            strip_signatures: true,
        },
    );
    let digest_value = BASE64.encode(Sha256::digest(digested.as_bytes()));

    // SignedInfo in its canonical form; this exact byte sequence is what
    // gets signed and what verification recomputes.
    let signed_info = build_signed_info(element_id, &digest_value)?;
    let signed_info_digest: [u8; 32] = Sha256::digest(signed_info.as_bytes()).into();
    let signature_value = BASE64.encode(capability.sign_digest(&signed_info_digest)?);
    let certificate_value = certificate.material_base64();

    let signature_block = build_signature_block(&signed_info, &signature_value, &certificate_value)?;
    let signature_elem = Element::parse(signature_block.as_str())?;
    insert_after_signed_element(&mut root, element_id, signature_elem)?;

    let signed_xml = canonicalize(&root, "", C14nOptions::default());

    Ok(SignedEnvelope {
        xml: signed_xml.into_string(),
        element_id: element_id.to_string(),
        digest: digest_value,
        signature: signature_value,
        certificate: certificate_value,
    })
}

/// Verify the enveloped signature of `signed_xml`.
///
/// Returns `Ok(false)` when the recomputed digest or the signature value
/// does not match; structural problems (no signature block, undecodable
/// material, missing referenced element) surface as errors.
pub fn verify(signed_xml: &str) -> Result<bool, SignError> {
    let root = Element::parse(signed_xml)?;
    let signature = find_signature(&root).ok_or_else(|| SignError::ElementNotFound {
        id: "Signature".into(),
    })?;

    let reference = signature
        .find_first("Reference")
        .ok_or_else(|| malformed("signature has no Reference"))?;
    let uri = reference
        .attr("URI")
        .ok_or_else(|| malformed("Reference has no URI"))?;
    let element_id = uri.strip_prefix('#').unwrap_or(uri);
    let digest_value = reference
        .find_first("DigestValue")
        .ok_or_else(|| malformed("Reference has no DigestValue"))?
        .text();
    let signature_value = signature
        .find_first("SignatureValue")
        .ok_or_else(|| malformed("signature has no SignatureValue"))?
        .text();
    let certificate_value = signature
        .find_first("X509Certificate")
        .ok_or_else(|| malformed("signature has no X509Certificate"))?
        .text();

    let (target, target_ns) =
        root.find_by_id_scoped(element_id)
            .ok_or_else(|| SignError::ElementNotFound {
                id: element_id.to_string(),
            })?;

    // Recompute the reference digest.
    let digested = canonicalize(
        target,
        &target_ns,
        C14nOptions {
            strip_signatures: true,
        },
    );
    let actual_digest = Sha256::digest(digested.as_bytes());
    let expected_digest = BASE64
        .decode(digest_value.trim())
        .map_err(|e| malformed(&format!("undecodable DigestValue: {e}")))?;
    if expected_digest.len() != actual_digest.len() {
        return Ok(false);
    }
    if actual_digest
        .as_slice()
        .ct_eq(expected_digest.as_slice())
        .unwrap_u8()
        == 0
    {
        return Ok(false);
    }

    // Validate the signature over the canonicalized SignedInfo.
    let signed_info = signature
        .find_first("SignedInfo")
        .ok_or_else(|| malformed("signature has no SignedInfo"))?;
    let signed_info_c14n = canonicalize(signed_info, XMLDSIG_NS, C14nOptions::default());
    let signed_info_digest = Sha256::digest(signed_info_c14n.as_bytes());

    let signature_bytes = BASE64
        .decode(signature_value.trim())
        .map_err(|e| malformed(&format!("undecodable SignatureValue: {e}")))?;
    let certificate_bytes = BASE64
        .decode(certificate_value.trim())
        .map_err(|e| malformed(&format!("undecodable X509Certificate: {e}")))?;
    let public_key = public_key_from_material(&certificate_bytes)?;

    Ok(public_key
        .verify(
            Pkcs1v15Sign::new::<Sha256>(),
            &signed_info_digest,
            &signature_bytes,
        )
        .is_ok())
}

fn malformed(reason: &str) -> SignError {
    SignError::VerificationFailed {
        reason: reason.to_string(),
    }
}

fn find_signature(root: &Element) -> Option<&Element> {
    find_signature_inner(root, "")
}

fn find_signature_inner<'a>(elem: &'a Element, inherited_ns: &str) -> Option<&'a Element> {
    let effective = elem.attr("xmlns").unwrap_or(inherited_ns);
    if elem.local_name() == "Signature" && effective == XMLDSIG_NS {
        return Some(elem);
    }
    for child in elem.child_elements() {
        if let Some(found) = find_signature_inner(child, effective) {
            return Some(found);
        }
    }
    None
}

fn build_signed_info(element_id: &str, digest_value: &str) -> Result<CanonicalXml, SignError> {
    let uri = format!("#{element_id}");
    let mut b = XmlBuilder::new();
    b.open_with_attrs("SignedInfo", &[("xmlns", XMLDSIG_NS)]);
    b.open_with_attrs("CanonicalizationMethod", &[("Algorithm", ALGO_C14N)]);
    b.close();
    b.open_with_attrs("SignatureMethod", &[("Algorithm", ALGO_RSA_SHA256)]);
    b.close();
    b.open_with_attrs("Reference", &[("URI", uri.as_str())]);
    b.open("Transforms");
    b.open_with_attrs("Transform", &[("Algorithm", ALGO_ENVELOPED)]);
    b.close();
    b.open_with_attrs("Transform", &[("Algorithm", ALGO_C14N)]);
    b.close();
    b.close();
    b.open_with_attrs("DigestMethod", &[("Algorithm", ALGO_SHA256)]);
    b.close();
    b.leaf("DigestValue", digest_value);
    b.close(); // Reference
    b.close(); // SignedInfo
    b.finish().map_err(SignError::Xml)
}

fn build_signature_block(
    signed_info: &CanonicalXml,
    signature_value: &str,
    certificate_value: &str,
) -> Result<CanonicalXml, SignError> {
    // The SignedInfo fragment declares the XML-DSig namespace itself; the
    // canonicalizer collapses the redundant declaration when the block is
    // re-serialized inside the Signature element.
    let mut b = XmlBuilder::new();
    b.open_with_attrs("Signature", &[("xmlns", XMLDSIG_NS)]);
    b.fragment(signed_info);
    b.leaf("SignatureValue", signature_value);
    b.open("KeyInfo");
    b.open("X509Data");
    b.leaf("X509Certificate", certificate_value);
    b.close();
    b.close();
    b.close(); // Signature
    b.finish().map_err(SignError::Xml)
}

/// Insert `signature` as the last child of the parent of the element
/// carrying `Id = element_id`. When the signed element is the document
/// root, the signature becomes its last child instead.
fn insert_after_signed_element(
    root: &mut Element,
    element_id: &str,
    signature: Element,
) -> Result<(), SignError> {
    if root.attr("Id") == Some(element_id) {
        root.children.push(Node::Element(signature));
        return Ok(());
    }
    if insert_into_parent(root, element_id, &signature) {
        Ok(())
    } else {
        Err(SignError::ElementNotFound {
            id: element_id.to_string(),
        })
    }
}

fn insert_into_parent(elem: &mut Element, element_id: &str, signature: &Element) -> bool {
    let is_parent = elem
        .child_elements()
        .any(|child| child.attr("Id") == Some(element_id));
    if is_parent {
        elem.children.push(Node::Element(signature.clone()));
        return true;
    }
    for child in elem.children.iter_mut() {
        if let Node::Element(child_elem) = child {
            if insert_into_parent(child_elem, element_id, signature) {
                return true;
            }
        }
    }
    false
}

//! Diagnostic helpers: secret masking and LDIF rendering for debug logs
//!
//! Nothing here affects reconciliation; the output only ever reaches logs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::ignore::is_ignored;
use crate::model::{AttributeMap, OBJECT_CLASS};

/// Attribute types masked when no explicit list is configured
pub const DEFAULT_SENSITIVE_ATTRIBUTES: &[&str] = &["userPassword"];

/// Replacement text for masked values
pub const REDACTED: &str = "<REDACTED>";

/// Copy of `attributes` with every value of a sensitive type replaced by [`REDACTED`]
pub fn mask_attributes(attributes: &AttributeMap, sensitive_attributes: &[String]) -> AttributeMap {
    attributes
        .iter()
        .map(|(attribute_type, values)| {
            let values = if is_ignored(attribute_type, sensitive_attributes) {
                values.iter().map(|_| REDACTED.to_string()).collect()
            } else {
                values.clone()
            };
            (attribute_type.clone(), values)
        })
        .collect()
}

/// Render an entry as an LDIF content record, masking sensitive values
///
/// `objectClass` lines come first, the remaining attribute types follow in
/// map order. Values that are not LDIF safe strings are base64 encoded.
pub fn to_ldif(dn: &str, attributes: &AttributeMap, sensitive_attributes: &[String]) -> String {
    let masked = mask_attributes(attributes, sensitive_attributes);
    let mut out = String::new();
    push_line(&mut out, "dn", dn);

    if let Some(classes) = masked.get(OBJECT_CLASS) {
        for class in classes {
            push_line(&mut out, OBJECT_CLASS, class);
        }
    }
    for (attribute_type, values) in &masked {
        if attribute_type == OBJECT_CLASS {
            continue;
        }
        for value in values {
            push_line(&mut out, attribute_type, value);
        }
    }
    out
}

fn push_line(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    if is_safe_string(value) {
        out.push_str(": ");
        out.push_str(value);
    } else {
        out.push_str(":: ");
        out.push_str(&STANDARD.encode(value.as_bytes()));
    }
    out.push('\n');
}

/// RFC 2849 SAFE-STRING check
fn is_safe_string(value: &str) -> bool {
    let bytes = value.as_bytes();
    if let Some(&first) = bytes.first()
        && matches!(first, b' ' | b':' | b'<')
    {
        return false;
    }
    if bytes.last() == Some(&b' ') {
        return false;
    }
    bytes
        .iter()
        .all(|&b| b.is_ascii() && b != b'\0' && b != b'\n' && b != b'\r')
}

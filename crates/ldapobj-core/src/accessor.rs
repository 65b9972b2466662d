//! Directory entry accessor
//!
//! Single-entry lookup with an exact-one-result contract. Zero results and
//! several results fail the same way, with the count in the message.

use crate::error::{Error, Result};
use crate::model::{DirectoryObject, SearchScope};
use crate::traits::Directory;
use tracing::debug;

/// Filter matching every entry
pub const MATCH_ALL_FILTER: &str = "(objectClass=*)";

/// Attribute selector for all user attributes
pub const ALL_USER_ATTRIBUTES: &str = "*";

/// Fetch the entry at `dn`
///
/// Runs one base-scope search for `*` plus `extra_attributes` (for example
/// operational attributes such as `createTimestamp`). No retry: a transport
/// error from the directory is returned as is.
///
/// # Returns
///
/// - `Ok(DirectoryObject)`: The entry, with `objectClass` split out
/// - `Err(Error::NotFoundOrAmbiguous)`: The search did not return exactly one entry
pub async fn fetch(
    directory: &dyn Directory,
    dn: &str,
    extra_attributes: &[String],
) -> Result<DirectoryObject> {
    let mut requested = Vec::with_capacity(extra_attributes.len() + 1);
    requested.push(ALL_USER_ATTRIBUTES.to_string());
    requested.extend(extra_attributes.iter().cloned());

    debug!("Reading entry {} from {}", dn, directory.directory_name());
    let mut entries = directory
        .search(dn, SearchScope::BaseObject, MATCH_ALL_FILTER, &requested)
        .await?;

    if entries.len() != 1 {
        return Err(Error::not_found_or_ambiguous(dn, entries.len()));
    }
    let entry = entries.remove(0);
    Ok(DirectoryObject::from(entry))
}

//! Paginated, prefix-stripped enumeration of objects under a publish prefix.

use tracing::{debug, warn};

use crate::client::{ListEntry, ObjectClient};
use crate::error::{PublishError, Result};
use crate::path::{self, DELIMITER};

/// Absolute key prefix for listing `prefix` under `root`.
///
/// Non-empty prefixes get a trailing delimiter so `test` never matches
/// `testa`.
pub(crate) fn listing_prefix(root: &str, prefix: &str) -> String {
    let mut absolute = path::resolve(root, prefix);
    if !absolute.is_empty() {
        absolute.push(DELIMITER);
    }
    absolute
}

/// List every object under `root`/`prefix`, following continuation markers
/// until the store reports no further pages.
///
/// Returned paths are relative to the queried prefix, in the order the
/// store yields them.
pub(crate) async fn enumerate(
    client: &dyn ObjectClient,
    root: &str,
    prefix: &str,
    storage: &str,
) -> Result<Vec<ListEntry>> {
    let absolute = listing_prefix(root, prefix);
    let mut entries = Vec::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = client
            .list_page(&absolute, marker.as_deref())
            .await
            .map_err(|source| PublishError::Listing {
                prefix: absolute.clone(),
                storage: storage.to_string(),
                source,
            })?;
        pages += 1;

        for entry in page.entries {
            match entry.path.strip_prefix(absolute.as_str()) {
                Some(relative) => entries.push(ListEntry {
                    path: relative.to_string(),
                    checksum: entry.checksum,
                }),
                None => warn!(key = %entry.path, prefix = %absolute, "listing returned key outside prefix, skipping"),
            }
        }

        match page.next_marker {
            Some(next) => marker = Some(next),
            None => break,
        }
    }

    debug!(prefix = %absolute, pages, count = entries.len(), "enumerated objects");
    Ok(entries)
}

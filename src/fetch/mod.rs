// src/fetch/mod.rs

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::store::{BackingStore, Row, StoreError};

pub const DEFAULT_PAGE_SIZE: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("page size must be at least 1")]
    ZeroPageSize,

    #[error("reading `{table}` at offset {offset} failed: {source}")]
    Page {
        table: String,
        offset: usize,
        #[source]
        source: StoreError,
    },
}

/// Read every row of `table`, asking for `page_size` rows at a time, until an
/// empty page marks the end. The offset advances by the rows actually served,
/// so a store that caps rows per response still yields the whole table.
/// Any failed page fails the whole read; partial results are dropped.
#[instrument(level = "info", skip(store))]
pub async fn fetch_all_rows(
    store: &dyn BackingStore,
    table: &str,
    page_size: usize,
) -> Result<Vec<Row>, FetchError> {
    if page_size == 0 {
        return Err(FetchError::ZeroPageSize);
    }

    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let page = store
            .range_select(table, offset, page_size)
            .await
            .map_err(|source| FetchError::Page {
                table: table.to_string(),
                offset,
                source,
            })?;
        let n = page.len();
        debug!(table, offset, rows = n, "page");
        if n == 0 {
            break;
        }
        if n < page_size {
            debug!(table, offset, requested = page_size, served = n, "short page");
        }
        rows.extend(page);
        offset += n;
    }

    info!(table, rows = rows.len(), "fetched table");
    Ok(rows)
}

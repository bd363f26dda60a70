//! Cross-repository definition and reference resolution.
//!
//! A dump only knows monikers; the index maps a moniker's package to the dump
//! that declares it and to the dumps whose filters say they may use the
//! identifier. Candidates that cannot be opened are logged and skipped.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::LsifResult;
use crate::models::{DumpKey, Location, Package};
use crate::query::guards::MAX_CROSS_REPO_LOCATIONS;
use crate::store::database::DumpDatabase;
use crate::store::schema::MonikerTable;
use crate::store::StoreContext;

fn open_candidate(ctx: &Arc<StoreContext>, key: DumpKey) -> Option<DumpDatabase> {
    match DumpDatabase::open(Arc::clone(ctx), key.clone()) {
        Ok(db) => Some(db),
        Err(e) if e.is_no_data() => {
            debug!(dump = %key, "candidate dump has no data");
            None
        }
        Err(e) => {
            warn!(dump = %key, error = %e, "skipping candidate dump that failed to load");
            None
        }
    }
}

/// Moniker rows of one remote dump; a failing dump contributes nothing.
fn candidate_locations(
    ctx: &Arc<StoreContext>,
    key: DumpKey,
    table: MonikerTable,
    scheme: &str,
    identifier: &str,
) -> Vec<Location> {
    let Some(db) = open_candidate(ctx, key) else {
        return Vec::new();
    };
    match db.moniker_locations(table, scheme, identifier) {
        Ok(locations) => locations,
        Err(e) => {
            warn!(dump = %db.key(), error = %e, "skipping candidate dump that failed to answer");
            Vec::new()
        }
    }
}

/// Definitions of `identifier` in the dump that declares `package`.
pub fn remote_definitions(
    ctx: &Arc<StoreContext>,
    package: &Package,
    identifier: &str,
) -> LsifResult<Vec<Location>> {
    let Some(owner) = ctx
        .xrepo
        .get_package(&package.scheme, &package.name, &package.version)?
    else {
        debug!(package = %package.name, version = %package.version, "no dump declares package");
        return Ok(Vec::new());
    };
    Ok(candidate_locations(
        ctx,
        owner,
        MonikerTable::Definitions,
        &package.scheme,
        identifier,
    ))
}

/// References to `identifier` from `package` in every other dump: first the
/// declaring dump, then each filter-positive dependent, newest registration first.
pub fn remote_references(
    ctx: &Arc<StoreContext>,
    package: &Package,
    identifier: &str,
    exclude: &DumpKey,
) -> LsifResult<Vec<Location>> {
    let owner = ctx
        .xrepo
        .get_package(&package.scheme, &package.name, &package.version)?
        .filter(|owner| owner != exclude);
    let candidates = ctx
        .xrepo
        .find_referencing_dumps(package, identifier, Some(exclude))?;

    let mut locations = Vec::new();
    let mut keys: Vec<DumpKey> = owner.into_iter().collect();
    for candidate in candidates {
        if !keys.contains(&candidate) {
            keys.push(candidate);
        }
    }
    for key in keys {
        if locations.len() >= MAX_CROSS_REPO_LOCATIONS {
            debug!(identifier, cap = MAX_CROSS_REPO_LOCATIONS, "cross-repository location cap reached");
            break;
        }
        locations.extend(candidate_locations(
            ctx,
            key,
            MonikerTable::References,
            &package.scheme,
            identifier,
        ));
    }
    locations.truncate(MAX_CROSS_REPO_LOCATIONS);
    Ok(locations)
}

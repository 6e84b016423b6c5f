//! Organization endpoint inheritance, grounded verbatim on
//! `directory/new_insert.py`'s `insert_one_org_one_iteration` /
//! `insert_prod_directory`.
//!
//! For an org whose `part_of` is set: the parent's `managing_org` is
//! always inherited. If the org itself is missing at least one
//! responder URL and the parent has all three, the org additionally
//! inherits the parent's three URLs *and* its own oid is reassigned to
//! the parent's — collapsing the child row onto the parent's identity.
//! This is a deliberately lossy merge the original source performs and
//! this crate preserves rather than "fixes" (see DESIGN.md).

use crate::{DirectoryError, DirectoryStore};
use xcpd_core::model::DirectoryOrganization;

const MAX_PASSES: usize = 5;

/// Runs up to [`MAX_PASSES`] inheritance passes, stopping early once a
/// pass inherits zero URL sets, then deletes any row still incomplete.
/// Returns the per-pass inheritance counts.
pub async fn run_inheritance_passes(store: &impl DirectoryStore) -> Result<Vec<usize>, DirectoryError> {
    let mut history = Vec::new();

    for pass in 0..MAX_PASSES {
        let oids: Vec<String> = store.all_organizations().await?.into_iter().map(|org| org.oid).collect();
        let mut inherited = 0;

        for oid in oids {
            let Some(org) = store.organization_by_oid(&oid).await? else {
                continue;
            };
            if apply_inheritance(store, org).await? {
                inherited += 1;
            }
        }

        tracing::info!(pass, inherited, "directory inheritance pass complete");
        history.push(inherited);
        if inherited == 0 {
            break;
        }
    }

    let removed = store.delete_incomplete().await?;
    tracing::info!(removed, "cleaned up incomplete directory rows");

    Ok(history)
}

async fn apply_inheritance(store: &impl DirectoryStore, mut org: DirectoryOrganization) -> Result<bool, DirectoryError> {
    let Some(part_of) = org.part_of.clone() else {
        return Ok(false);
    };
    let Some(parent) = store.organization_by_oid(&part_of).await? else {
        return Ok(false);
    };

    let original_oid = org.oid.clone();
    org.managing_org = parent.managing_org.clone();

    let inherited_urls = !org.has_all_urls() && parent.has_all_urls();
    if inherited_urls {
        org.iti55_responder = parent.iti55_responder.clone();
        org.iti38_responder = parent.iti38_responder.clone();
        org.iti39_responder = parent.iti39_responder.clone();
        org.oid = parent.oid.clone();
    }

    store.upsert_organization(&org).await?;
    if org.oid != original_oid {
        store.delete_organization(&original_oid).await?;
    }

    Ok(inherited_urls)
}

//! Result-set chain resolution.
//!
//! A range's hover, definition, reference, and moniker data may live on the
//! range itself or on any result set reachable through `next`. Chains come
//! from untrusted input, so every walk tracks visited result sets and fails
//! with [`LsifError::ResultSetCycle`] instead of looping.

use std::collections::HashSet;

use crate::errors::{LsifError, LsifResult};
use crate::models::{DocumentData, Id, MonikerData, ResultLinks};

/// Iterator over `start` followed by every result set on its `next` chain.
pub struct Chain<'a, F> {
    next: Option<&'a ResultLinks>,
    lookup: F,
    visited: HashSet<&'a str>,
    failed: bool,
}

pub fn chain<'a, F>(start: &'a ResultLinks, lookup: F) -> Chain<'a, F>
where
    F: Fn(&str) -> Option<&'a ResultLinks>,
{
    Chain {
        next: Some(start),
        lookup,
        visited: HashSet::new(),
        failed: false,
    }
}

impl<'a, F> Iterator for Chain<'a, F>
where
    F: Fn(&str) -> Option<&'a ResultLinks>,
{
    type Item = LsifResult<&'a ResultLinks>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let current = self.next.take()?;
        if let Some(next_id) = current.next.as_deref() {
            if !self.visited.insert(next_id) {
                self.failed = true;
                return Some(Err(LsifError::ResultSetCycle {
                    id: next_id.to_string(),
                }));
            }
            // A dangling `next` simply ends the chain.
            self.next = (self.lookup)(next_id);
        }
        Some(Ok(current))
    }
}

fn document_chain<'a>(
    document: &'a DocumentData,
    links: &'a ResultLinks,
) -> Chain<'a, impl Fn(&str) -> Option<&'a ResultLinks>> {
    chain(links, move |id: &str| document.result_sets.get(id))
}

/// First value `select` finds along the chain starting at `links`.
pub fn resolve<'a, T, S>(
    document: &'a DocumentData,
    links: &'a ResultLinks,
    select: S,
) -> LsifResult<Option<T>>
where
    S: Fn(&'a ResultLinks) -> Option<T>,
{
    for step in document_chain(document, links) {
        if let Some(found) = select(step?) {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

pub fn hover_result<'a>(
    document: &'a DocumentData,
    links: &'a ResultLinks,
) -> LsifResult<Option<&'a Id>> {
    resolve(document, links, |l| l.hover_result.as_ref())
}

pub fn definition_result<'a>(
    document: &'a DocumentData,
    links: &'a ResultLinks,
) -> LsifResult<Option<&'a Id>> {
    resolve(document, links, |l| l.definition_result.as_ref())
}

pub fn reference_result<'a>(
    document: &'a DocumentData,
    links: &'a ResultLinks,
) -> LsifResult<Option<&'a Id>> {
    resolve(document, links, |l| l.reference_result.as_ref())
}

/// Every moniker attached anywhere on the chain, nearest first.
pub fn monikers<'a>(
    document: &'a DocumentData,
    links: &'a ResultLinks,
) -> LsifResult<Vec<&'a MonikerData>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for step in document_chain(document, links) {
        for id in &step?.monikers {
            if seen.insert(id.as_str()) {
                if let Some(moniker) = document.monikers.get(id) {
                    out.push(moniker);
                }
            }
        }
    }
    Ok(out)
}

//! Newest-first paginated scan bounded by the checkpoint and the lookback window

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::AuditEvent;

use super::client::PageSource;

/// Where a scan stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the event recorded by the previous cycle
    Checkpoint,
    /// Reached an event older than the lookback cutoff
    Lookback,
    /// The last page had no next link
    LastPage,
    /// Hit `max_pages` before any other bound
    PageLimit,
}

/// Limits applied to one scan.
#[derive(Debug, Clone)]
pub struct ScanBounds<'a> {
    /// GUID of the newest event already delivered
    pub checkpoint: Option<&'a str>,
    /// Events created before this instant are not collected
    pub cutoff: DateTime<Utc>,
    pub max_pages: usize,
}

impl ScanBounds<'_> {
    /// Position and reason of the first event that ends the scan.
    fn boundary(&self, events: &[AuditEvent]) -> Option<(usize, StopReason)> {
        events.iter().enumerate().find_map(|(idx, event)| {
            if self.checkpoint == Some(event.guid.as_str()) {
                Some((idx, StopReason::Checkpoint))
            } else if event.created_at < self.cutoff {
                Some((idx, StopReason::Lookback))
            } else {
                None
            }
        })
    }
}

/// Events collected by one scan, newest-first.
#[derive(Debug)]
pub struct Gathered {
    pub events: Vec<AuditEvent>,
    pub pages: usize,
    pub stop: StopReason,
}

/// Walk pages from `first_link` until a boundary event or the last page.
///
/// Pages are fetched one at a time; nothing past the boundary page is requested.
pub async fn gather<S>(source: &S, first_link: &str, bounds: &ScanBounds<'_>) -> Result<Gathered>
where
    S: PageSource + ?Sized,
{
    let mut events = Vec::new();
    let mut link = first_link.to_string();
    let mut pages = 0;

    loop {
        let page = source.fetch_page(&link).await?;
        pages += 1;

        let next = page.next_link().map(str::to_string);
        let mut resources = page.resources;

        if let Some((idx, stop)) = bounds.boundary(&resources) {
            resources.truncate(idx);
            events.extend(resources);
            return Ok(Gathered {
                events,
                pages,
                stop,
            });
        }
        events.extend(resources);

        match next {
            Some(next) if pages < bounds.max_pages => link = next,
            Some(_) => {
                tracing::warn!(
                    pages,
                    events = events.len(),
                    "Page limit reached before checkpoint or lookback bound"
                );
                return Ok(Gathered {
                    events,
                    pages,
                    stop: StopReason::PageLimit,
                });
            }
            None => {
                return Ok(Gathered {
                    events,
                    pages,
                    stop: StopReason::LastPage,
                })
            }
        }
    }
}

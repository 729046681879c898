//! Library maintenance services: filesystem scanning, catalog
//! reconciliation, metadata resolution, media fetching, per-file
//! enrichment, orphan sweeping and archive/box-texture composition.

pub mod boxart;
pub mod composer;
pub mod enricher;
pub mod media;
pub mod reaper;
pub mod reconciler;
pub mod scanner;
pub mod scraper;

pub mod page_pipeline;
pub mod worker;

pub use page_pipeline::{collect_pages, PagePipeline};
pub use worker::{BatchWorker, WorkerEvent};

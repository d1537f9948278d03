use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageMetrics {
    pub page_number: usize,
    pub block_count: usize,
    pub planned_mm: f32,
    pub composed_mm: f32,
    pub compose_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaginationMetrics {
    pub pages: Vec<PageMetrics>,
    pub block_count: usize,
    pub physical_pages: usize,
    pub surfaces_created: u64,
    pub measure_ms: f64,
    pub plan_ms: f64,
    pub compose_ms: f64,
    pub assemble_ms: f64,
    pub total_ms: f64,
    pub output_bytes: usize,
}

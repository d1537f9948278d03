use log::debug;

/// A finished group of consecutive blocks destined for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGroup {
    /// 1-based.
    pub number: usize,
    pub block_indices: Vec<usize>,
    pub heights: Vec<f32>,
    pub total_mm: f32,
    /// A lone block taller than the usable height.
    pub overflow: bool,
}

impl PageGroup {
    pub fn len(&self) -> usize {
        self.block_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_indices.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Accumulating,
    Closed,
}

/// Outcome of feeding one block to the planner.
#[derive(Debug, Clone, PartialEq)]
pub enum PushResult {
    Placed,
    /// The block did not fit; the returned page was closed and the block
    /// opened the next one.
    ClosedPage(PageGroup),
}

/// Greedy page-break state: one open page and a running height.
///
/// A page is closed before a block when the block would push the running
/// height strictly past the usable height and the page already holds
/// something. A block that merely reaches the boundary stays.
#[derive(Debug, Clone)]
pub struct PlannerState {
    usable_mm: f32,
    phase: Phase,
    next_number: usize,
    indices: Vec<usize>,
    heights: Vec<f32>,
    running_mm: f32,
}

impl PlannerState {
    pub fn new(usable_mm: f32) -> Self {
        Self {
            usable_mm,
            phase: Phase::Empty,
            next_number: 1,
            indices: Vec::new(),
            heights: Vec::new(),
            running_mm: 0.0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn running_mm(&self) -> f32 {
        self.running_mm
    }

    pub fn usable_mm(&self) -> f32 {
        self.usable_mm
    }

    pub fn push(&mut self, index: usize, height_mm: f32) -> PushResult {
        let closed = if self.running_mm + height_mm > self.usable_mm && !self.indices.is_empty()
        {
            debug!(
                "page {} closed at {:.2}mm; block #{} ({:.2}mm) starts the next page",
                self.next_number, self.running_mm, index, height_mm
            );
            Some(self.close())
        } else {
            None
        };
        self.indices.push(index);
        self.heights.push(height_mm);
        self.running_mm += height_mm;
        self.phase = Phase::Accumulating;
        match closed {
            Some(page) => PushResult::ClosedPage(page),
            None => PushResult::Placed,
        }
    }

    /// Closes the open page, if it holds anything.
    pub fn finish(&mut self) -> Option<PageGroup> {
        if self.indices.is_empty() {
            return None;
        }
        Some(self.close())
    }

    fn close(&mut self) -> PageGroup {
        let heights = std::mem::take(&mut self.heights);
        let overflow = heights.len() == 1 && self.running_mm > self.usable_mm;
        let page = PageGroup {
            number: self.next_number,
            block_indices: std::mem::take(&mut self.indices),
            heights,
            total_mm: self.running_mm,
            overflow,
        };
        self.next_number += 1;
        self.running_mm = 0.0;
        self.phase = Phase::Closed;
        page
    }
}

/// Plans pages for `(block index, height)` pairs given in document order.
pub fn plan<I>(blocks: I, usable_mm: f32) -> Vec<PageGroup>
where
    I: IntoIterator<Item = (usize, f32)>,
{
    let mut state = PlannerState::new(usable_mm);
    let mut pages = Vec::new();
    for (index, height) in blocks {
        if let PushResult::ClosedPage(page) = state.push(index, height) {
            pages.push(page);
        }
    }
    pages.extend(state.finish());
    pages
}

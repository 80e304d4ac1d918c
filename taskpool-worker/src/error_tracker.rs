/// Consecutive frames the worker could not decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorTracker {
    pub malformed_frames: Vec<String>,
}

impl ErrorTracker {
    /// Records a failure and reports whether the tolerance is now exceeded.
    pub fn record(&mut self, error: String, max_error_tolerance: usize) -> bool {
        self.malformed_frames.push(error);
        self.malformed_frames.len() > max_error_tolerance
    }

    pub fn clear(&mut self) {
        self.malformed_frames.clear();
    }
}

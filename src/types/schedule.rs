//! Time schedules
//!
//! A schedule is the ordered, immutable sequence of time points a filter
//! walks through. Each point records whether it carries an observation
//! and whether it requires output, with running indices into the
//! observation source and the output store.

// ============================================================================
// Schedule Element
// ============================================================================

/// One point of a [`Schedule`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleElement {
    time: f64,
    index_time: usize,
    has_obs: bool,
    index_obs: usize,
    has_output: bool,
    index_output: usize,
}

impl ScheduleElement {
    /// Creates a schedule element.
    ///
    /// `index_obs` and `index_output` are only meaningful when the
    /// corresponding flag is set.
    pub fn new(
        time: f64,
        index_time: usize,
        has_obs: bool,
        index_obs: usize,
        has_output: bool,
        index_output: usize,
    ) -> Self {
        Self {
            time,
            index_time,
            has_obs,
            index_obs,
            has_output,
            index_output,
        }
    }

    /// Time of this point.
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Position of this point within its schedule.
    #[inline]
    pub fn index_time(&self) -> usize {
        self.index_time
    }

    /// Does an observation arrive at this point?
    #[inline]
    pub fn has_obs(&self) -> bool {
        self.has_obs
    }

    /// Index into the observation source.
    #[inline]
    pub fn index_obs(&self) -> usize {
        self.index_obs
    }

    /// Must the filter emit output at this point?
    #[inline]
    pub fn has_output(&self) -> bool {
        self.has_output
    }

    /// Index of the output record written at this point.
    #[inline]
    pub fn index_output(&self) -> usize {
        self.index_output
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// An ordered sequence of [`ScheduleElement`]s.
///
/// # Invariants
///
/// - Times are non-decreasing.
/// - `index_time` equals the position of the element.
/// - Observation and output indices count up from zero over the points
///   that carry them.
/// - Every observation point is also an output point.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    elements: Vec<ScheduleElement>,
}

impl Schedule {
    /// Creates a schedule from explicit elements.
    ///
    /// # Panics
    /// Panics if the elements are empty or out of time order, if an
    /// observation point does not require output, or if the indices are
    /// inconsistent with their positions.
    pub fn from_elements(elements: Vec<ScheduleElement>) -> Self {
        assert!(!elements.is_empty(), "Schedule must have at least one point");
        let mut n_obs = 0;
        let mut n_output = 0;
        for (i, e) in elements.iter().enumerate() {
            assert!(e.time.is_finite(), "Schedule times must be finite");
            assert_eq!(e.index_time, i, "Schedule point {} has index_time {}", i, e.index_time);
            if i > 0 {
                assert!(
                    elements[i - 1].time <= e.time,
                    "Schedule times must be non-decreasing"
                );
            }
            if e.has_obs {
                assert!(e.has_output, "Observation point {} must require output", i);
                assert_eq!(e.index_obs, n_obs, "Observation indices must count up from zero");
                n_obs += 1;
            }
            if e.has_output {
                assert_eq!(
                    e.index_output, n_output,
                    "Output indices must count up from zero"
                );
                n_output += 1;
            }
        }
        Self { elements }
    }

    /// Starts building a schedule at time `start`.
    pub fn builder(start: f64) -> ScheduleBuilder {
        ScheduleBuilder::new(start)
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Always false; a schedule holds at least one point.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the point at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    pub fn get(&self, index: usize) -> &ScheduleElement {
        &self.elements[index]
    }

    /// First point of the schedule.
    #[inline]
    pub fn first(&self) -> &ScheduleElement {
        &self.elements[0]
    }

    /// Last point of the schedule.
    #[inline]
    pub fn last(&self) -> &ScheduleElement {
        &self.elements[self.elements.len() - 1]
    }

    /// Iterates over all points in time order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduleElement> {
        self.elements.iter()
    }

    /// Number of points carrying an observation.
    pub fn num_obs(&self) -> usize {
        self.elements.iter().filter(|e| e.has_obs).count()
    }

    /// Number of points requiring output.
    pub fn num_outputs(&self) -> usize {
        self.elements.iter().filter(|e| e.has_output).count()
    }
}

// ============================================================================
// Schedule Builder
// ============================================================================

/// Builds a [`Schedule`] from observation and output times.
///
/// The resulting schedule contains the start time, every observation time,
/// every output time and the end time, merged and deduplicated. The start,
/// the end and every observation point require output, so a filter never
/// steps past an observation without correcting against it.
#[derive(Debug, Clone)]
pub struct ScheduleBuilder {
    start: f64,
    end: Option<f64>,
    obs_times: Vec<f64>,
    output_times: Vec<f64>,
    output_every: Option<f64>,
}

impl ScheduleBuilder {
    /// Creates a builder starting at `start`.
    pub fn new(start: f64) -> Self {
        Self {
            start,
            end: None,
            obs_times: Vec::new(),
            output_times: Vec::new(),
            output_every: None,
        }
    }

    /// Sets the end time. Defaults to the latest observation or output time.
    pub fn end(mut self, end: f64) -> Self {
        self.end = Some(end);
        self
    }

    /// Adds observation times.
    pub fn observations(mut self, times: &[f64]) -> Self {
        self.obs_times.extend_from_slice(times);
        self
    }

    /// Adds output times that carry no observation.
    pub fn outputs(mut self, times: &[f64]) -> Self {
        self.output_times.extend_from_slice(times);
        self
    }

    /// Adds output points every `interval` from the start time.
    ///
    /// # Panics
    /// Panics if `interval <= 0`.
    pub fn output_every(mut self, interval: f64) -> Self {
        assert!(interval > 0.0, "Output interval must be positive");
        self.output_every = Some(interval);
        self
    }

    /// Builds the schedule.
    ///
    /// # Panics
    /// Panics if any time is not finite, if the end precedes the start, or
    /// if an observation time falls outside `[start, end]`.
    pub fn build(self) -> Schedule {
        assert!(self.start.is_finite(), "Schedule start must be finite");
        let latest = self
            .obs_times
            .iter()
            .chain(self.output_times.iter())
            .copied()
            .fold(self.start, f64::max);
        let end = self.end.unwrap_or(latest);
        assert!(end.is_finite(), "Schedule end must be finite");
        assert!(
            end >= self.start,
            "Schedule end {} precedes start {}",
            end,
            self.start
        );

        let mut obs = self.obs_times.clone();
        for &t in &obs {
            assert!(
                t.is_finite() && t >= self.start && t <= end,
                "Observation time {} outside [{}, {}]",
                t,
                self.start,
                end
            );
        }
        obs.sort_by(f64::total_cmp);
        obs.dedup();

        let mut outputs: Vec<f64> = self
            .output_times
            .iter()
            .copied()
            .filter(|&t| t >= self.start && t <= end)
            .collect();
        if let Some(interval) = self.output_every {
            let mut k = 1;
            loop {
                let t = self.start + k as f64 * interval;
                if t > end {
                    break;
                }
                outputs.push(t);
                k += 1;
            }
        }
        outputs.push(self.start);
        outputs.push(end);

        let mut times: Vec<f64> = obs.iter().chain(outputs.iter()).copied().collect();
        times.sort_by(f64::total_cmp);
        times.dedup();

        let mut elements = Vec::with_capacity(times.len());
        let mut n_obs = 0;
        let mut n_output = 0;
        for (i, &t) in times.iter().enumerate() {
            let has_obs = obs.binary_search_by(|o| o.total_cmp(&t)).is_ok();
            let has_output = has_obs || outputs.iter().any(|&o| o == t);
            elements.push(ScheduleElement::new(
                t, i, has_obs, n_obs, has_output, n_output,
            ));
            if has_obs {
                n_obs += 1;
            }
            if has_output {
                n_output += 1;
            }
        }

        Schedule::from_elements(elements)
    }
}

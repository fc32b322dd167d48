//! Per-frame synthesis hop scheduling.
//!
//! The calculator tracks two positions: the input centre of the next frame
//! and the output position its synthesis frame will be placed at. Output
//! positions are derived from a piecewise-linear map of input to output time
//! whose slope is the current time ratio; a ratio change starts a new segment
//! at the current input position so earlier output is never reinterpreted.
//!
//! In precise mode every hop is the rounded distance to where the map says
//! the next frame belongs, so accumulated error never exceeds one sample. In
//! elastic mode (offline, imprecise, studied) a per-frame plan is computed up
//! front: transient frames keep their natural spacing and the stretch is
//! spread over the frames between them, weighted towards quiet and steady
//! material. Region budgets are fixed by the map, so durations still land
//! exactly at every keyframe.

use crate::profile::{AnalysisProfile, FrameFeatures};

/// Frames with weight below this get no more than half the average stretch.
const MIN_WEIGHT: f64 = 0.5;
/// Weight given to quiet frames.
const QUIET_WEIGHT: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct StretchCalculator {
    ratio: f64,
    max_increment: usize,
    /// Input centre of the next frame
    input_position: u64,
    /// Output position of the next frame
    output_position: u64,
    /// Input position where the current ratio took effect
    segment_input: u64,
    /// Output position (unrounded) matching `segment_input`
    segment_output: f64,
    /// Elastic increments, indexed by frame
    plan: Vec<usize>,
    frame: usize,
}

impl StretchCalculator {
    /// `max_increment` caps any single synthesis hop.
    pub fn new(ratio: f64, max_increment: usize) -> Self {
        Self {
            ratio,
            max_increment: max_increment.max(1),
            input_position: 0,
            output_position: 0,
            segment_input: 0,
            segment_output: 0.0,
            plan: Vec::new(),
            frame: 0,
        }
    }

    #[inline]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Index of the next frame.
    #[inline]
    pub fn frame(&self) -> usize {
        self.frame
    }

    #[inline]
    pub fn input_position(&self) -> u64 {
        self.input_position
    }

    #[inline]
    pub fn output_position(&self) -> u64 {
        self.output_position
    }

    #[inline]
    pub fn has_plan(&self) -> bool {
        !self.plan.is_empty()
    }

    /// Change the time ratio from the current input position onward.
    ///
    /// Drops any elastic plan, since its budgets assumed the old ratio.
    pub fn set_ratio(&mut self, ratio: f64) {
        self.segment_output = self.mapped(self.input_position);
        self.segment_input = self.input_position;
        self.ratio = ratio;
        self.plan.clear();
    }

    /// Output position corresponding to an input position.
    pub fn expected_output(&self, input_position: u64) -> u64 {
        self.mapped(input_position).round().max(0.0) as u64
    }

    /// Compute an elastic plan for a studied input.
    ///
    /// Only valid before the first frame, with the profile built at the
    /// analysis hop that will be used throughout. A unity ratio has nothing
    /// to distribute and keeps uniform hops.
    pub fn plan_elastic(&mut self, profile: &AnalysisProfile) {
        if self.frame != 0 || profile.is_empty() || self.ratio == 1.0 {
            return;
        }
        self.plan = elastic_increments(profile, self.ratio, self.max_increment);
    }

    /// Synthesis hop for the next frame, advancing both positions.
    pub fn next_increment(&mut self, input_hop: usize) -> usize {
        let next_input = self.input_position + input_hop as u64;
        let increment = match self.plan.get(self.frame) {
            Some(&planned) => planned,
            None => self
                .expected_output(next_input)
                .saturating_sub(self.output_position) as usize,
        }
        .min(self.max_increment);

        self.input_position = next_input;
        self.output_position += increment as u64;
        self.frame += 1;
        increment
    }

    pub fn reset(&mut self, ratio: f64) {
        *self = Self::new(ratio, self.max_increment);
    }

    fn mapped(&self, input_position: u64) -> f64 {
        let delta = input_position as f64 - self.segment_input as f64;
        self.segment_output + delta * self.ratio
    }
}

/// Per-frame synthesis hops distributing stretch around transients.
fn elastic_increments(profile: &AnalysisProfile, ratio: f64, max_increment: usize) -> Vec<usize> {
    let frames = profile.frames();
    let n = frames.len();
    let hop = profile.hop() as u64;
    let position = |k: usize| (k as u64 * hop) as f64 * ratio;

    let mut keyframes: Vec<usize> = std::iter::once(0)
        .chain(profile.transient_frames())
        .chain(std::iter::once(n))
        .collect();
    keyframes.dedup();

    let mut increments = vec![0usize; n];
    for pair in keyframes.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let budget = (position(end).round() - position(start).round()).max(0.0) as u64;
        let mut remaining = budget;
        let mut first = start;

        // a transient keeps its natural spacing to the next frame
        if frames[start].transient && end - start > 1 {
            let natural = hop.min(remaining);
            increments[start] = natural as usize;
            remaining -= natural;
            first += 1;
        }

        distribute(remaining, &frames[first..end], &mut increments[first..end]);
    }

    // carry anything over the cap into the following frames
    let mut carry = 0usize;
    for inc in increments.iter_mut() {
        let wanted = *inc + carry;
        *inc = wanted.min(max_increment);
        carry = wanted - *inc;
    }

    increments
}

fn distribute(budget: u64, frames: &[FrameFeatures], increments: &mut [usize]) {
    if frames.is_empty() {
        return;
    }

    let weights: Vec<f64> = frames
        .iter()
        .map(|f| {
            if f.is_quiet() {
                QUIET_WEIGHT
            } else {
                (1.0 / (1.0 + f.onset as f64)).max(MIN_WEIGHT)
            }
        })
        .collect();
    let total: f64 = weights.iter().sum();

    // running rounding keeps the region sum exact
    let mut acc = 0.0f64;
    let mut assigned = 0u64;
    for (inc, w) in increments.iter_mut().zip(&weights) {
        acc += budget as f64 * w / total;
        let target = acc.round() as u64;
        *inc = (target - assigned) as usize;
        assigned = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(calc: &mut StretchCalculator, hop: usize, frames: usize) -> Vec<usize> {
        (0..frames).map(|_| calc.next_increment(hop)).collect()
    }

    #[test]
    fn test_unity_ratio_matches_hop() {
        let mut calc = StretchCalculator::new(1.0, 1024);
        assert!(run(&mut calc, 512, 50).iter().all(|&h| h == 512));
        assert_eq!(calc.output_position(), 50 * 512);
    }

    #[test]
    fn test_precise_hops_never_drift() {
        let ratio = 1.37;
        let mut calc = StretchCalculator::new(ratio, 1024);
        for _ in 0..1000 {
            calc.next_increment(373);
            let ideal = calc.input_position() as f64 * ratio;
            assert!((calc.output_position() as f64 - ideal).abs() <= 0.5 + 1e-9);
        }
    }

    #[test]
    fn test_hop_cap() {
        let mut calc = StretchCalculator::new(8.0, 1024);
        assert_eq!(calc.next_increment(512), 1024);
    }

    #[test]
    fn test_ratio_change_rebases() {
        let mut calc = StretchCalculator::new(2.0, 4096);
        run(&mut calc, 100, 10);
        assert_eq!(calc.output_position(), 2000);

        calc.set_ratio(0.5);
        assert_eq!(calc.expected_output(1000), 2000);
        assert_eq!(calc.expected_output(1200), 2100);
        run(&mut calc, 100, 2);
        assert_eq!(calc.output_position(), 2100);
    }

    #[test]
    fn test_reset() {
        let mut calc = StretchCalculator::new(2.0, 4096);
        run(&mut calc, 100, 3);
        calc.reset(1.5);
        assert_eq!(calc.frame(), 0);
        assert_eq!(calc.output_position(), 0);
        assert_eq!(calc.ratio(), 1.5);
    }

    fn profile(transients: &[usize], n: usize, hop: usize) -> AnalysisProfile {
        let frames = (0..n)
            .map(|i| FrameFeatures {
                onset: if transients.contains(&i) { 0.9 } else { 0.1 },
                transient: transients.contains(&i),
                energy: 0.1,
            })
            .collect();
        AnalysisProfile::new(hop, (n * hop) as u64, frames)
    }

    #[test]
    fn test_elastic_plan_hits_keyframes_exactly() {
        let hop = 256;
        let ratio = 2.0;
        let p = profile(&[10, 25], 40, hop);
        let mut calc = StretchCalculator::new(ratio, 1024);
        calc.plan_elastic(&p);
        assert!(calc.has_plan());

        let incs = run(&mut calc, hop, 40);
        let sum_to = |k: usize| incs[..k].iter().sum::<usize>() as f64;
        for k in [10, 25, 40] {
            assert_eq!(sum_to(k), (k * hop) as f64 * ratio);
        }
        // transient frames keep their natural spacing
        assert_eq!(incs[10], hop);
        assert_eq!(incs[25], hop);
        // so the rest stretch further than the average
        assert!(incs[12] > (hop as f64 * ratio) as usize);
    }

    #[test]
    fn test_elastic_plan_favours_quiet_frames() {
        let hop = 256;
        let mut frames: Vec<FrameFeatures> = (0..20)
            .map(|_| FrameFeatures {
                onset: 0.2,
                transient: false,
                energy: 0.1,
            })
            .collect();
        frames[5].energy = 0.0;
        let p = AnalysisProfile::new(hop, 20 * 256, frames);

        let mut calc = StretchCalculator::new(1.5, 2048);
        calc.plan_elastic(&p);
        let incs = run(&mut calc, hop, 20);
        assert!(incs[5] > incs[4]);
        assert_eq!(incs.iter().sum::<usize>(), (20.0 * 256.0 * 1.5) as usize);
    }

    #[test]
    fn test_elastic_falls_back_after_plan() {
        let hop = 128;
        let p = profile(&[], 8, hop);
        let mut calc = StretchCalculator::new(3.0, 1024);
        calc.plan_elastic(&p);
        run(&mut calc, hop, 8);
        // past the studied frames the absolute map takes over without a jump
        let inc = calc.next_increment(hop);
        assert_eq!(inc, 384);
    }

    #[test]
    fn test_plan_ignored_after_processing_starts() {
        let mut calc = StretchCalculator::new(2.0, 1024);
        calc.next_increment(100);
        calc.plan_elastic(&profile(&[3], 10, 100));
        assert!(!calc.has_plan());
    }

    #[test]
    fn test_unity_ratio_skips_plan() {
        let mut calc = StretchCalculator::new(1.0, 1024);
        calc.plan_elastic(&profile(&[2, 5], 10, 256));
        assert!(!calc.has_plan());
        assert!(run(&mut calc, 256, 10).iter().all(|&h| h == 256));
    }

    #[test]
    fn test_compression_plan_respects_cap() {
        let p = profile(&[4], 12, 512);
        let mut calc = StretchCalculator::new(0.25, 1024);
        calc.plan_elastic(&p);
        let incs = run(&mut calc, 512, 12);
        assert!(incs.iter().all(|&h| h <= 1024));
        assert_eq!(incs.iter().sum::<usize>(), 12 * 128);
    }
}

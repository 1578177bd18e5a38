use crate::RegistrationError;

/// The accumulation policy applied to recorded values within a [`View`][crate::View].
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    /// Counts records regardless of their value.
    Count,
    /// Sums recorded values.
    Sum,
    /// Keeps the most recently recorded value.
    ///
    /// Concurrent records racing on the same tag combination may leave either value in place.
    LastValue,
    /// Buckets recorded values, also tracking their count and sum.
    Distribution(BucketBoundaries),
}

impl Aggregation {
    /// Shorthand for a [`Distribution`][Aggregation::Distribution] with validated boundaries.
    ///
    /// # Errors
    ///
    /// See [`BucketBoundaries::new`].
    pub fn distribution(bounds: impl Into<Vec<f64>>) -> Result<Self, RegistrationError> {
        BucketBoundaries::new(bounds).map(Aggregation::Distribution)
    }
}

/// Upper bounds of distribution buckets, finite and strictly increasing.
///
/// A value lands in the first bucket whose bound is greater than or equal to it; values above the
/// last bound land in an implicit overflow bucket.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BucketBoundaries(Vec<f64>);

impl BucketBoundaries {
    /// Validate and wrap bucket upper bounds.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidBuckets`] when `bounds` is empty, holds a non-finite
    /// value, or is not strictly increasing.
    pub fn new(bounds: impl Into<Vec<f64>>) -> Result<Self, RegistrationError> {
        let bounds = bounds.into();
        if bounds.is_empty() {
            return Err(RegistrationError::InvalidBuckets("no boundaries"));
        }
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(RegistrationError::InvalidBuckets("boundaries must be finite"));
        }
        if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(RegistrationError::InvalidBuckets(
                "boundaries must be strictly increasing",
            ));
        }
        Ok(Self(bounds))
    }

    /// The upper bounds.
    #[must_use]
    pub fn bounds(&self) -> &[f64] {
        &self.0
    }

    fn bucket_index(&self, value: f64) -> usize {
        self.0.partition_point(|bound| *bound < value)
    }
}

/// Accumulated state of one view for one tag combination.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AggregationData {
    /// Number of records.
    Count(u64),
    /// Sum of recorded values.
    Sum(f64),
    /// The last recorded value.
    LastValue(f64),
    /// Bucketed values.
    Distribution(DistributionData),
}

/// State of a [`Distribution`][Aggregation::Distribution] aggregation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DistributionData {
    /// Number of recorded values.
    pub count: u64,
    /// Sum of recorded values.
    pub sum: f64,
    /// Upper bounds of the buckets.
    pub bounds: BucketBoundaries,
    /// Per-bucket (non-cumulative) counts; one longer than `bounds`, the last being overflow.
    pub bucket_counts: Vec<u64>,
}

impl AggregationData {
    /// State after the first record of a tag combination.
    ///
    /// State is always created holding a value, so readers never see an empty last value.
    pub(crate) fn first(aggregation: &Aggregation, value: f64) -> Self {
        let mut data = match aggregation {
            Aggregation::Count => AggregationData::Count(0),
            Aggregation::Sum => AggregationData::Sum(0.0),
            Aggregation::LastValue => AggregationData::LastValue(value),
            Aggregation::Distribution(bounds) => AggregationData::Distribution(DistributionData {
                count: 0,
                sum: 0.0,
                bucket_counts: vec![0; bounds.bounds().len() + 1],
                bounds: bounds.clone(),
            }),
        };
        data.fold(value);
        data
    }

    pub(crate) fn fold(&mut self, value: f64) {
        match self {
            AggregationData::Count(count) => *count += 1,
            AggregationData::Sum(sum) => *sum += value,
            AggregationData::LastValue(last) => *last = value,
            AggregationData::Distribution(dist) => {
                let index = dist.bounds.bucket_index(value);
                dist.bucket_counts[index] += 1;
                dist.count += 1;
                dist.sum += value;
            }
        }
    }
}

impl DistributionData {
    /// Cumulative bucket counts paired with their upper bound, ending with `+Inf`.
    #[must_use]
    pub fn cumulative_buckets(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        self.bounds
            .bounds()
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(&self.bucket_counts)
            .map(|(bound, count)| {
                running += count;
                (bound, running)
            })
            .collect()
    }
}

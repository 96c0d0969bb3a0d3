// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::rss::EnvelopeMetadata;

/// Conversion from envelope bin index to distance in meters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Scale {
    start: f64,
    step: f64,
    len: usize,
}

impl Scale {
    /// Spreads `length` meters starting at `start` evenly over `data_length`
    /// bins.  Returns None for an empty sweep.
    pub fn new(start: f64, length: f64, data_length: usize) -> Option<Self> {
        if data_length == 0 {
            return None;
        }
        Some(Scale {
            start,
            step: length / data_length as f64,
            len: data_length,
        })
    }

    /// Scale of the sweep described by `metadata`.
    pub fn from_metadata(metadata: &EnvelopeMetadata) -> Option<Self> {
        Scale::new(
            metadata.actual_start_m as f64,
            metadata.actual_length_m as f64,
            metadata.data_length as usize,
        )
    }

    /// Distance in meters of bin `index`.
    pub fn distance(&self, index: usize) -> f64 {
        self.start + index as f64 * self.step
    }

    /// Distance in meters of the first bin.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Meters per bin.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Distance in meters just past the last bin.
    pub fn end(&self) -> f64 {
        self.start + self.len as f64 * self.step
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false, empty sweeps have no scale.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Distances of every bin in order.
    pub fn distances(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).map(|index| self.distance(index))
    }
}

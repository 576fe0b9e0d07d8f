//! One-shot iterators over measurements, tag keys and tag values.
//!
//! Key and value iterators own a sorted snapshot, so they stay valid after the grid index
//! lock that produced them is released.

use crate::measurement::Measurement;
use std::slice;

/// Iterates live measurements in id order, skipping dropped slots.
#[derive(Debug)]
pub struct MeasurementIterator<'a> {
    slots: slice::Iter<'a, Option<Measurement>>,
}

impl<'a> MeasurementIterator<'a> {
    pub(crate) fn new(slots: &'a [Option<Measurement>]) -> Self {
        Self {
            slots: slots.iter(),
        }
    }
}

impl<'a> Iterator for MeasurementIterator<'a> {
    type Item = &'a Measurement;

    fn next(&mut self) -> Option<Self::Item> {
        self.slots.by_ref().find_map(Option::as_ref)
    }
}

#[derive(Debug)]
pub struct TagKeyIterator {
    keys: std::vec::IntoIter<String>,
}

impl TagKeyIterator {
    pub(crate) fn new(keys: Vec<String>) -> Self {
        Self {
            keys: keys.into_iter(),
        }
    }
}

impl Iterator for TagKeyIterator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.keys.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl ExactSizeIterator for TagKeyIterator {}

#[derive(Debug)]
pub struct TagValueIterator {
    values: std::vec::IntoIter<String>,
}

impl TagValueIterator {
    pub(crate) fn new(values: Vec<String>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }
}

impl Iterator for TagValueIterator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.values.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.values.size_hint()
    }
}

impl ExactSizeIterator for TagValueIterator {}

//! # Query Decomposers
//!
//! A decomposer splits a query into the initial checkpoint properties of its
//! CREATE tasks, one property map per partition. The store adds the
//! `PARTITION` index and the reserved `QUERY` property afterwards.

use crate::constants::checkpoint_properties;
use crate::error::{QueryStorageError, Result};
use crate::models::{PropertyMap, PropertyValue, QueryDefinition, QueryKey};
use std::fmt::Debug;

pub trait QueryDecomposer: Send + Sync + Debug {
    /// Exactly `partitions` property maps, in partition order
    fn decompose(
        &self,
        query_key: &QueryKey,
        definition: &QueryDefinition,
        partitions: usize,
    ) -> Result<Vec<PropertyMap>>;

    fn name(&self) -> &'static str;
}

/// One slot per partition, tagged with the partition count. The execution
/// engine interprets the slot (shard, worker slot, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct SlotDecomposer;

impl QueryDecomposer for SlotDecomposer {
    fn decompose(
        &self,
        _query_key: &QueryKey,
        _definition: &QueryDefinition,
        partitions: usize,
    ) -> Result<Vec<PropertyMap>> {
        let count = PropertyValue::Integer(partitions as i64);
        Ok((0..partitions)
            .map(|_| {
                let mut properties = PropertyMap::new();
                properties.insert(checkpoint_properties::PARTITION_COUNT.to_string(), count.clone());
                properties
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "slot"
    }
}

/// Splits the integer interval `[rangeStart, rangeEnd)` from the query
/// parameters into contiguous, non-empty sub-ranges.
#[derive(Debug, Default, Clone, Copy)]
pub struct RangeDecomposer;

impl RangeDecomposer {
    pub const START_PARAMETER: &'static str = "rangeStart";
    pub const END_PARAMETER: &'static str = "rangeEnd";

    fn bound(definition: &QueryDefinition, name: &str) -> Result<i64> {
        let raw = definition.parameter(name).ok_or_else(|| {
            QueryStorageError::invalid_argument(format!("range query requires parameter {name}"))
        })?;
        raw.trim().parse::<i64>().map_err(|_| {
            QueryStorageError::invalid_argument(format!("parameter {name} is not an integer: {raw}"))
        })
    }
}

impl QueryDecomposer for RangeDecomposer {
    fn decompose(
        &self,
        _query_key: &QueryKey,
        definition: &QueryDefinition,
        partitions: usize,
    ) -> Result<Vec<PropertyMap>> {
        let start = Self::bound(definition, Self::START_PARAMETER)?;
        let end = Self::bound(definition, Self::END_PARAMETER)?;
        let span = i128::from(end) - i128::from(start);
        if span < partitions as i128 {
            return Err(QueryStorageError::invalid_argument(format!(
                "range [{start}, {end}) cannot be split into {partitions} partitions"
            )));
        }

        let count = partitions as i128;
        let base = span / count;
        let remainder = span % count;
        let mut lower = i128::from(start);

        let mut maps = Vec::with_capacity(partitions);
        for index in 0..count {
            let width = base + i128::from(index < remainder);
            let upper = lower + width;
            let mut properties = PropertyMap::new();
            properties.insert(
                checkpoint_properties::PARTITION_COUNT.to_string(),
                PropertyValue::Integer(partitions as i64),
            );
            // bounds stay inside [start, end], which are i64
            properties.insert(
                checkpoint_properties::RANGE_START.to_string(),
                PropertyValue::Integer(lower as i64),
            );
            properties.insert(
                checkpoint_properties::RANGE_END.to_string(),
                PropertyValue::Integer(upper as i64),
            );
            maps.push(properties);
            lower = upper;
        }
        Ok(maps)
    }

    fn name(&self) -> &'static str {
        "range"
    }
}

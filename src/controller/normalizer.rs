//! Resource requirement defaulting
//!
//! Every dimension (cpu, memory, storage) is normalized independently:
//!
//! | user limit | user request | result                                             |
//! |------------|--------------|----------------------------------------------------|
//! | -          | -            | default limit, default request                     |
//! | -          | r            | limit = max(default limit, r), request = r         |
//! | l          | -            | limit = l, request = min(default request, l)       |
//! | l          | r            | passed through unchanged, even when l < r          |
//!
//! Dimensions without a default are passed through; when such a dimension
//! carries a limit below its request there is nothing to fall back on and the
//! block is rejected. Negative quantities are rejected in every dimension.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::quantity;
use crate::error::{Error, Result};

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";
pub const STORAGE: &str = "storage";

/// Default limits and requests for the dimensions of one resource category
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceDefaults {
    pub limits: BTreeMap<String, Quantity>,
    pub requests: BTreeMap<String, Quantity>,
}

fn quantities(entries: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect()
}

impl ResourceDefaults {
    /// Elasticsearch container compute defaults
    pub fn elasticsearch_compute() -> Self {
        Self {
            limits: quantities(&[(CPU, "1"), (MEMORY, "4Gi")]),
            requests: quantities(&[(CPU, "250m"), (MEMORY, "4Gi")]),
        }
    }

    /// Elasticsearch data volume defaults
    pub fn elasticsearch_storage() -> Self {
        Self {
            limits: quantities(&[(STORAGE, "10Gi")]),
            requests: quantities(&[(STORAGE, "10Gi")]),
        }
    }

    /// ECK operator `manager` container defaults
    pub fn eck_operator() -> Self {
        Self {
            limits: quantities(&[(CPU, "1"), (MEMORY, "512Mi")]),
            requests: quantities(&[(CPU, "100m"), (MEMORY, "512Mi")]),
        }
    }
}

/// Keep only the given dimensions of a requirement block
pub fn select_dimensions(
    requirements: Option<&ResourceRequirements>,
    keep: impl Fn(&str) -> bool,
) -> ResourceRequirements {
    let filter = |list: Option<&BTreeMap<String, Quantity>>| {
        list.map(|l| {
            l.iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>()
        })
        .filter(|l| !l.is_empty())
    };
    ResourceRequirements {
        limits: filter(requirements.and_then(|r| r.limits.as_ref())),
        requests: filter(requirements.and_then(|r| r.requests.as_ref())),
        ..Default::default()
    }
}

/// Fill in missing limits and requests from `defaults`.
///
/// `field` names the source of the block in error messages.
pub fn normalize(
    user: Option<&ResourceRequirements>,
    defaults: &ResourceDefaults,
    field: &str,
) -> Result<ResourceRequirements> {
    let empty = BTreeMap::new();
    let user_limits = user.and_then(|u| u.limits.as_ref()).unwrap_or(&empty);
    let user_requests = user.and_then(|u| u.requests.as_ref()).unwrap_or(&empty);

    let dimensions: BTreeSet<&String> = defaults
        .limits
        .keys()
        .chain(defaults.requests.keys())
        .chain(user_limits.keys())
        .chain(user_requests.keys())
        .collect();

    let mut limits = BTreeMap::new();
    let mut requests = BTreeMap::new();

    for dim in dimensions {
        let dim_field = format!("{field}.{dim}");
        let default_limit = defaults.limits.get(dim);
        let default_request = defaults.requests.get(dim);

        let (limit, request) = match (user_limits.get(dim), user_requests.get(dim)) {
            (None, None) => (default_limit.cloned(), default_request.cloned()),
            (None, Some(request)) => {
                let limit = match default_limit {
                    Some(d) if quantity::compare(d, request, &dim_field)? == Ordering::Greater => {
                        d.clone()
                    }
                    _ => request.clone(),
                };
                (Some(limit), Some(request.clone()))
            }
            (Some(limit), None) => {
                let request = match default_request {
                    Some(d) if quantity::compare(d, limit, &dim_field)? == Ordering::Less => {
                        d.clone()
                    }
                    _ => limit.clone(),
                };
                (Some(limit.clone()), Some(request))
            }
            (Some(limit), Some(request)) => {
                // A user limit below the request is kept as given when a
                // default exists for the dimension.
                let has_default = default_limit.is_some() || default_request.is_some();
                if !has_default
                    && quantity::compare(limit, request, &dim_field)? == Ordering::Less
                {
                    return Err(Error::validation(
                        dim_field,
                        format!(
                            "limit {} is lower than request {}",
                            limit.0, request.0
                        ),
                        "Raise the limit or lower the request for this resource.",
                    ));
                }
                (Some(limit.clone()), Some(request.clone()))
            }
        };

        if let Some(limit) = limit {
            non_negative(&limit, &format!("{field}.limits.{dim}"))?;
            limits.insert(dim.clone(), limit);
        }
        if let Some(request) = request {
            non_negative(&request, &format!("{field}.requests.{dim}"))?;
            requests.insert(dim.clone(), request);
        }
    }

    Ok(ResourceRequirements {
        limits: Some(limits),
        requests: Some(requests),
        claims: user.and_then(|u| u.claims.clone()),
    })
}

fn non_negative(value: &Quantity, field: &str) -> Result<()> {
    if quantity::parse(value, field)? < 0 {
        return Err(Error::validation(
            field,
            format!("quantity {} must not be negative", value.0),
            "Use a zero or positive quantity for this resource.",
        ));
    }
    Ok(())
}

/// JVM heap flags for an Elasticsearch container with `memory` available.
///
/// The heap is half the memory, rendered in whole gibibytes when the memory
/// is at least 2Gi and in whole mebibytes otherwise.
pub fn jvm_heap_options(memory: &Quantity, field: &str) -> Result<String> {
    non_negative(memory, field)?;
    let bytes = quantity::bytes(memory, field)?;
    let heap = bytes / 2;
    let size = if bytes >= 2 * quantity::BYTES_PER_GI {
        format!("{}G", heap / quantity::BYTES_PER_GI)
    } else {
        format!("{}M", heap / quantity::BYTES_PER_MI)
    };
    Ok(format!("-Xms{size} -Xmx{size}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    fn reqs(limits: &[(&str, &str)], requests: &[(&str, &str)]) -> ResourceRequirements {
        ResourceRequirements {
            limits: (!limits.is_empty()).then(|| quantities(limits)),
            requests: (!requests.is_empty()).then(|| quantities(requests)),
            ..Default::default()
        }
    }

    #[test]
    fn test_nothing_supplied_adopts_defaults() {
        let out = normalize(None, &ResourceDefaults::elasticsearch_compute(), "r").unwrap();
        assert_eq!(out, reqs(&[(CPU, "1"), (MEMORY, "4Gi")], &[(CPU, "250m"), (MEMORY, "4Gi")]));
    }

    #[test]
    fn test_both_supplied_pass_through() {
        let user = reqs(&[(CPU, "5"), (MEMORY, "2Gi")], &[(CPU, "500m"), (MEMORY, "2Gi")]);
        let out = normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r").unwrap();
        assert_eq!(out, user);
    }

    #[test]
    fn test_limit_below_request_is_not_clamped() {
        let user = reqs(&[(MEMORY, "1Gi")], &[(MEMORY, "2Gi")]);
        let out = normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r").unwrap();
        assert_eq!(out.limits.unwrap()[MEMORY], q("1Gi"));
        assert_eq!(out.requests.unwrap()[MEMORY], q("2Gi"));
    }

    #[test]
    fn test_request_only_raises_limit() {
        let user = reqs(&[], &[(CPU, "3"), (MEMORY, "1Gi")]);
        let out = normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r").unwrap();
        assert_eq!(out, reqs(&[(CPU, "3"), (MEMORY, "4Gi")], &[(CPU, "3"), (MEMORY, "1Gi")]));
    }

    #[test]
    fn test_limit_only_lowers_request() {
        let user = reqs(&[(MEMORY, "2Gi")], &[]);
        let out = normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r").unwrap();
        assert_eq!(out, reqs(&[(CPU, "1"), (MEMORY, "2Gi")], &[(CPU, "250m"), (MEMORY, "2Gi")]));

        let user = reqs(&[(MEMORY, "10Gi")], &[(CPU, "250m")]);
        let out = normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r").unwrap();
        assert_eq!(out, reqs(&[(CPU, "1"), (MEMORY, "10Gi")], &[(CPU, "250m"), (MEMORY, "4Gi")]));
    }

    #[test]
    fn test_storage_limit_only_matches_request() {
        let user = reqs(&[(STORAGE, "8Gi")], &[]);
        let out = normalize(Some(&user), &ResourceDefaults::elasticsearch_storage(), "r").unwrap();
        assert_eq!(out, reqs(&[(STORAGE, "8Gi")], &[(STORAGE, "8Gi")]));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let user = reqs(&[(MEMORY, "10Gi")], &[(CPU, "3")]);
        let defaults = ResourceDefaults::elasticsearch_compute();
        let once = normalize(Some(&user), &defaults, "r").unwrap();
        let twice = normalize(Some(&once), &defaults, "r").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_dimension_without_default_rejects_inverted_bounds() {
        let user = reqs(&[("ephemeral-storage", "1Gi")], &[("ephemeral-storage", "2Gi")]);
        let err = normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r");
        assert!(matches!(err, Err(Error::ValidationError(_))));

        let user = reqs(&[("ephemeral-storage", "2Gi")], &[("ephemeral-storage", "1Gi")]);
        let out = normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r").unwrap();
        assert_eq!(out.limits.unwrap()["ephemeral-storage"], q("2Gi"));
    }

    #[test]
    fn test_invalid_quantity_is_an_error() {
        let user = reqs(&[], &[(CPU, "fast")]);
        let err = normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r");
        assert!(matches!(err, Err(Error::InvalidQuantity { .. })));
    }

    #[test]
    fn test_negative_quantity_is_rejected() {
        let user = reqs(&[], &[(MEMORY, "-1Gi")]);
        match normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r") {
            Err(Error::ValidationError(errors)) => {
                assert_eq!(errors[0].field, "r.requests.memory");
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let user = reqs(&[(CPU, "-500m")], &[(CPU, "250m")]);
        let err = normalize(Some(&user), &ResourceDefaults::elasticsearch_compute(), "r");
        assert!(matches!(err, Err(Error::ValidationError(_))));

        let user = reqs(&[(STORAGE, "-10Gi")], &[]);
        let err = normalize(Some(&user), &ResourceDefaults::elasticsearch_storage(), "r");
        assert!(matches!(err, Err(Error::ValidationError(_))));
    }

    #[test]
    fn test_select_dimensions_splits_storage() {
        let user = reqs(&[(CPU, "1")], &[(MEMORY, "1Gi"), (STORAGE, "5Gi")]);
        let compute = select_dimensions(Some(&user), |d| d != STORAGE);
        let storage = select_dimensions(Some(&user), |d| d == STORAGE);
        assert_eq!(compute, reqs(&[(CPU, "1")], &[(MEMORY, "1Gi")]));
        assert_eq!(storage, reqs(&[], &[(STORAGE, "5Gi")]));
    }

    #[test]
    fn test_heap_options() {
        assert_eq!(jvm_heap_options(&q("4Gi"), "m").unwrap(), "-Xms2G -Xmx2G");
        assert_eq!(jvm_heap_options(&q("2Gi"), "m").unwrap(), "-Xms1G -Xmx1G");
        assert_eq!(jvm_heap_options(&q("1Gi"), "m").unwrap(), "-Xms512M -Xmx512M");
        assert_eq!(jvm_heap_options(&q("150Mi"), "m").unwrap(), "-Xms75M -Xmx75M");
        assert_eq!(jvm_heap_options(&q("3Gi"), "m").unwrap(), "-Xms1G -Xmx1G");
        assert!(matches!(
            jvm_heap_options(&q("-1Gi"), "m"),
            Err(Error::ValidationError(_))
        ));
    }
}

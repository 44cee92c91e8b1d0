//! Geofence monitoring port.
//!
//! The platform location service is consumed, never implemented here. The
//! engine receives `RegionEvent`s through a cancellable subscription and
//! must deregister regions when tracking stops -- registrations are scoped
//! resources that leak background wake-ups otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::LocationError;
use crate::model::JobSite;

/// Geofence boundary crossing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionTransition {
    Enter,
    Exit,
}

/// One enter/exit callback from the platform monitor.
///
/// `timestamp` is when the crossing happened, which may be well before the
/// callback is delivered (wake-on-event batching, redelivery).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionEvent {
    pub region_id: String,
    pub transition: RegionTransition,
    pub timestamp: DateTime<Utc>,
}

/// A circular region to monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceRegion {
    pub region_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl GeofenceRegion {
    /// Region covering a job site; region id is the site id so callbacks
    /// map straight back to the schedule.
    pub fn for_site(site: &JobSite) -> Self {
        Self {
            region_id: site.site_id.clone(),
            latitude: site.latitude,
            longitude: site.longitude,
            radius_meters: site.radius_meters,
        }
    }
}

/// Stream of region events for one registration. Dropping the receiver
/// does not deregister the region; callers own that via `deregister`.
pub type RegionSubscription = mpsc::Receiver<RegionEvent>;

/// Platform location capability, injected into the session worker.
#[async_trait::async_trait]
pub trait LocationMonitor: Send + Sync {
    /// Register a region and get the event stream for it.
    async fn register(&self, region: GeofenceRegion)
        -> Result<RegionSubscription, LocationError>;

    /// Stop monitoring a region. Idempotent.
    async fn deregister(&self, region_id: &str) -> Result<(), LocationError>;
}

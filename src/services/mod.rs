//! Interface boundary to the collaborators the cron jobs call into.
//!
//! Each collaborator sits behind a trait: an HTTP mail relay, an HTTP
//! geocoder and the platform's internal community-services API. Null
//! implementations stand in when a collaborator is not configured and in
//! tests.

mod community;
mod geocoder;
mod mailer;

pub use community::{CommunityApiClient, CommunityServices, NullCommunityServices};
pub use geocoder::{Geocoder, GeoPoint, HttpGeocoder, NullGeocoder};
pub use mailer::{HttpRelayMailer, Mailer, NullMailer};

use std::sync::Arc;

/// Bundle of service handles passed to jobs through the cron context.
#[derive(Clone)]
pub struct Services {
    pub mailer: Arc<dyn Mailer>,
    pub geocoder: Arc<dyn Geocoder>,
    pub community: Arc<dyn CommunityServices>,
}

impl Services {
    /// All-null services: mail and geocoding silently succeed, community
    /// operations report zero work. Used in tests and as the fallback when
    /// nothing is configured.
    pub fn null() -> Self {
        Self {
            mailer: Arc::new(NullMailer),
            geocoder: Arc::new(NullGeocoder),
            community: Arc::new(NullCommunityServices),
        }
    }
}

use anyhow::{Context, Result};
use log::warn;
use maxminddb::geoip2;
use serde::Serialize;
use std::net::IpAddr;
use std::path::Path;

/// One plotted peer for the network map.
#[derive(Debug, Clone, Serialize)]
pub struct GeoPoint {
    pub host: String,
    /// [latitude, longitude]
    pub ll: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// MaxMind city-database resolver. Optional: without a configured database
/// the map endpoint serves an empty list.
pub struct GeoResolver {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl GeoResolver {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let reader = maxminddb::Reader::open_readfile(path.as_ref())
            .with_context(|| format!("opening geoip database {:?}", path.as_ref()))?;
        Ok(Self { reader })
    }

    /// Resolve a peer address of the form `ip:port` (or a bare ip).
    pub fn locate(&self, addr: &str) -> Option<GeoPoint> {
        let host = addr.rsplit_once(':').map(|(h, _)| h).unwrap_or(addr);
        let ip: IpAddr = host.trim_matches(|c| c == '[' || c == ']').parse().ok()?;
        let city: geoip2::City = match self.reader.lookup(ip) {
            Ok(city) => city,
            Err(e) => {
                warn!("geoip lookup failed for {}: {}", host, e);
                return None;
            }
        };
        let location = city.location.as_ref()?;
        let (Some(lat), Some(lon)) = (location.latitude, location.longitude) else {
            return None;
        };
        Some(GeoPoint {
            host: host.to_string(),
            ll: [lat, lon],
            country: city
                .country
                .as_ref()
                .and_then(|c| c.iso_code)
                .map(|c| c.to_string()),
            city: city
                .city
                .as_ref()
                .and_then(|c| c.names.as_ref())
                .and_then(|n| n.get("en"))
                .map(|n| n.to_string()),
        })
    }
}

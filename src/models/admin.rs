//! Administrative area types produced by the WOF ingest pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// WOF placetype. Each PIP layer holds features of exactly one placetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Placetype {
    Neighbourhood,
    Borough,
    Locality,
    LocalAdmin,
    County,
    MacroCounty,
    MacroRegion,
    Region,
    Dependency,
    Country,
    Empire,
    Continent,
    Ocean,
    MarineArea,
}

impl Placetype {
    /// Layers loaded when the caller does not name any, most specific first.
    pub fn default_layers() -> &'static [Placetype] {
        &[
            Placetype::Neighbourhood,
            Placetype::Borough,
            Placetype::Locality,
            Placetype::LocalAdmin,
            Placetype::County,
            Placetype::MacroCounty,
            Placetype::MacroRegion,
            Placetype::Region,
            Placetype::Dependency,
            Placetype::Country,
        ]
    }

    /// Get the WOF name for this placetype
    pub fn as_str(&self) -> &'static str {
        match self {
            Placetype::Neighbourhood => "neighbourhood",
            Placetype::Borough => "borough",
            Placetype::Locality => "locality",
            Placetype::LocalAdmin => "localadmin",
            Placetype::County => "county",
            Placetype::MacroCounty => "macrocounty",
            Placetype::MacroRegion => "macroregion",
            Placetype::Region => "region",
            Placetype::Dependency => "dependency",
            Placetype::Country => "country",
            Placetype::Empire => "empire",
            Placetype::Continent => "continent",
            Placetype::Ocean => "ocean",
            Placetype::MarineArea => "marinearea",
        }
    }

    /// Countries and dependencies carry ISO country codes as abbreviations.
    pub fn is_country_like(&self) -> bool {
        matches!(self, Placetype::Country | Placetype::Dependency)
    }
}

impl fmt::Display for Placetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown placetype '{0}'")]
pub struct UnknownPlacetype(pub String);

impl FromStr for Placetype {
    type Err = UnknownPlacetype;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neighbourhood" => Ok(Placetype::Neighbourhood),
            "borough" => Ok(Placetype::Borough),
            "locality" => Ok(Placetype::Locality),
            "localadmin" => Ok(Placetype::LocalAdmin),
            "county" => Ok(Placetype::County),
            "macrocounty" => Ok(Placetype::MacroCounty),
            "macroregion" => Ok(Placetype::MacroRegion),
            "region" => Ok(Placetype::Region),
            "dependency" => Ok(Placetype::Dependency),
            "country" => Ok(Placetype::Country),
            "empire" => Ok(Placetype::Empire),
            "continent" => Ok(Placetype::Continent),
            "ocean" => Ok(Placetype::Ocean),
            "marinearea" => Ok(Placetype::MarineArea),
            other => Err(UnknownPlacetype(other.to_string())),
        }
    }
}

/// Representative point of an area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

/// Fields extracted from a WOF record; this is what a PIP lookup returns per layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminArea {
    /// WOF id
    pub id: i64,

    /// Resolved display name
    pub name: String,

    pub placetype: Placetype,

    pub centroid: Centroid,

    /// "minLon,minLat,maxLon,maxLat"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<String>,

    /// ISO3 code for countries, shortcode otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abbreviation: Option<String>,

    /// Ancestor ids, one list per hierarchy chain. `[[id]]` when no ancestry is known.
    pub hierarchy: Vec<Vec<i64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placetype_parse_is_case_insensitive() {
        assert_eq!(" LocalAdmin ".parse::<Placetype>(), Ok(Placetype::LocalAdmin));
        assert!("campus".parse::<Placetype>().is_err());
    }

    #[test]
    fn test_default_layers_round_trip_names() {
        for layer in Placetype::default_layers() {
            assert_eq!(layer.as_str().parse::<Placetype>().as_ref(), Ok(layer));
        }
        assert_eq!(Placetype::default_layers().len(), 10);
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&Placetype::MacroCounty).unwrap();
        assert_eq!(json, "\"macrocounty\"");
    }
}

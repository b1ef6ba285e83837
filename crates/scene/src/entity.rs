use foundation::math::{GeoPoint, wrap_lng_deg};
use serde::{Deserialize, Serialize};

/// One record of an external feed snapshot.
///
/// The feed layer is expected to have dropped records without position, speed
/// or heading; everything else is optional and carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub altitude_meters: f64,
    #[serde(default)]
    pub ground_speed_ms: f64,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub vertical_rate_ms: f64,
    #[serde(default)]
    pub callsign: Option<String>,
    #[serde(default)]
    pub squawk: Option<String>,
    #[serde(default)]
    pub category_code: u32,
    #[serde(default)]
    pub last_contact_epoch: Option<f64>,
    #[serde(default)]
    pub barometric_altitude_meters: Option<f64>,
    #[serde(default)]
    pub special_purpose_flag: bool,
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Kinematics {
    pub ground_speed_ms: f64,
    /// True heading, degrees clockwise from north.
    pub heading_deg: f64,
    pub vertical_rate_ms: f64,
}

/// Fields the engine never interprets beyond the special-purpose highlight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayFields {
    pub callsign: Option<String>,
    pub squawk: Option<String>,
    pub last_contact_epoch: Option<f64>,
    pub barometric_altitude_m: Option<f64>,
    pub special_purpose: bool,
}

/// A live aircraft as owned by the motion model.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub position: GeoPoint,
    pub altitude_m: f64,
    pub kinematics: Kinematics,
    pub category_code: u32,
    pub display: DisplayFields,
}

impl EntitySnapshot {
    fn kinematics(&self) -> Kinematics {
        Kinematics {
            ground_speed_ms: self.ground_speed_ms,
            heading_deg: self.heading_deg,
            vertical_rate_ms: self.vertical_rate_ms,
        }
    }

    fn into_display(self) -> DisplayFields {
        DisplayFields {
            callsign: self.callsign,
            squawk: self.squawk,
            last_contact_epoch: self.last_contact_epoch,
            barometric_altitude_m: self.barometric_altitude_meters,
            special_purpose: self.special_purpose_flag,
        }
    }
}

impl Entity {
    /// Replaces everything but the position.
    pub(crate) fn replace_attributes(&mut self, s: EntitySnapshot) {
        self.altitude_m = s.altitude_meters;
        self.kinematics = s.kinematics();
        self.category_code = s.category_code;
        self.display = s.into_display();
    }
}

impl From<EntitySnapshot> for Entity {
    fn from(mut s: EntitySnapshot) -> Self {
        Entity {
            id: std::mem::take(&mut s.id),
            position: GeoPoint::new(s.lat, wrap_lng_deg(s.lng)),
            altitude_m: s.altitude_meters,
            kinematics: s.kinematics(),
            category_code: s.category_code,
            display: s.into_display(),
        }
    }
}

//! Motor and coordinate system status elements, and which of their values
//! are considered normal.

use ppmac_comm::parse_i64;
use std::collections::HashMap;

use crate::monitor::VarValue;

/// A status element and, when known, its value in a healthy system.
#[derive(Debug, Clone, Copy)]
pub struct StatusVar {
    pub name: &'static str,
    pub normal: Option<i64>,
}

const fn status(name: &'static str, normal: Option<i64>) -> StatusVar {
    StatusVar { name, normal }
}

pub const MOTOR_STATUS: &[StatusVar] = &[
    status("AmpEna", Some(1)),
    status("AmpFault", Some(0)),
    status("AmpWarn", Some(0)),
    status("AuxFault", Some(0)),
    status("BlDir", None),
    status("ClosedLoop", Some(1)),
    status("DacLimit", Some(0)),
    status("DesVelZero", None),
    status("EncLoss", Some(0)),
    status("FeFatal", Some(0)),
    status("FeWarn", Some(0)),
    status("HomeComplete", Some(1)),
    status("HomeInProgress", Some(0)),
    status("I2tFault", Some(0)),
    status("InPos", None),
    status("LimitStop", Some(0)),
    status("MinusLimit", Some(0)),
    status("PhaseFound", Some(1)),
    status("PlusLimit", Some(0)),
    status("SoftLimit", Some(0)),
    status("SoftMinusLimit", Some(0)),
    status("SoftPlusLimit", Some(0)),
    status("TriggerMove", None),
    status("TriggerNotFound", Some(0)),
];

pub const COORD_STATUS: &[StatusVar] = &[
    status("AmpEna", Some(1)),
    status("AmpFault", Some(0)),
    status("ClosedLoop", Some(1)),
    status("DesVelZero", None),
    status("ErrorStatus", Some(0)),
    status("FeFatal", Some(0)),
    status("FeWarn", Some(0)),
    status("InPos", None),
    status("LimitStop", Some(0)),
    status("ProgActive", None),
    status("ProgProceeding", None),
    status("ProgRunning", None),
    status("SoftLimit", Some(0)),
    status("TimersEnabled", None),
];

/// `Coord[].ErrorStatus` codes: short name and explanation.
const COORD_ERRORS: &[(i64, &str, &str)] = &[
    (1, "RunTimeError", "Run-time error in motion program"),
    (2, "DesVelZero", "Move requested with zero velocity"),
    (3, "MoveTimeOverflow", "Move time too large"),
    (4, "CircleRadiusError", "Circle move radius error"),
    (5, "LinToPvtError", "Linear to PVT conversion error"),
    (6, "ProgramEmpty", "Program buffer empty or not defined"),
    (7, "NotReady", "Coordinate system not ready to run (motors open loop?)"),
    (8, "NoMotors", "No motors assigned to the coordinate system"),
    (9, "BufferFull", "Lookahead buffer full"),
    (10, "AxisConflict", "Axis assigned to more than one motor"),
];

pub fn coord_error(code: i64) -> Option<(&'static str, &'static str)> {
    COORD_ERRORS
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, name, text)| (*name, *text))
}

/// Builds the element list for `mstatus`/`cstatus`: the standard set minus
/// `ignore`, plus `additional`, each prefixed with `base` (`Motor[1]`).
pub fn status_variables(
    base: &str,
    standard: &[StatusVar],
    additional: &[String],
    ignore: &[String],
) -> Vec<String> {
    let mut names: Vec<String> = standard
        .iter()
        .map(|s| s.name.to_string())
        .filter(|name| !ignore.iter().any(|i| i.eq_ignore_ascii_case(name)))
        .collect();
    names.extend(additional.iter().cloned());
    names
        .into_iter()
        .map(|name| format!("{}.{}", base, name))
        .collect()
}

/// Decides which status values are worth showing.
///
/// Requested elements (or everything with `all`) are always shown, as are
/// elements with no known normal value. An element at its normal value is
/// hidden unless it was shown on the previous poll, so that a return to
/// normal is still reported.
pub struct StatusFilter {
    all: bool,
    additional: Vec<String>,
    normals: HashMap<String, i64>,
    shown: HashMap<String, bool>,
}

impl StatusFilter {
    pub fn new(standard: &[StatusVar], additional: &[String], all: bool) -> Self {
        Self {
            all,
            additional: additional.iter().map(|a| a.to_ascii_lowercase()).collect(),
            normals: standard
                .iter()
                .filter_map(|s| s.normal.map(|n| (s.name.to_ascii_lowercase(), n)))
                .collect(),
            shown: HashMap::new(),
        }
    }

    /// `variable` is the full name, e.g. `Motor[1].AmpEna`.
    pub fn filter(&mut self, variable: &str, value: &VarValue) -> Option<String> {
        let variable = variable.to_ascii_lowercase();
        let element = variable.rsplit('.').next().unwrap_or(&variable).to_string();
        let requested = self
            .additional
            .iter()
            .any(|a| variable == *a || variable.ends_with(&format!(".{}", a)));

        let text = value.to_string();
        let VarValue::Value(raw) = value else {
            return Some(text);
        };

        let shown = if self.all || requested {
            true
        } else {
            match (self.normals.get(&element), parse_i64(raw)) {
                (Some(normal), Some(current)) if current == *normal => {
                    self.shown.get(&element).copied().unwrap_or(false)
                }
                _ => true,
            }
        };

        self.shown.insert(element, shown);
        shown.then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(v: &str) -> VarValue {
        VarValue::Value(v.to_string())
    }

    #[test]
    fn test_status_variables() {
        let vars = status_variables(
            "Motor[2]",
            MOTOR_STATUS,
            &["Servo.Kp".to_string()],
            &["ampena".to_string()],
        );
        assert!(!vars.iter().any(|v| v == "Motor[2].AmpEna"));
        assert!(vars.contains(&"Motor[2].ClosedLoop".to_string()));
        assert_eq!(vars.last().map(String::as_str), Some("Motor[2].Servo.Kp"));
    }

    #[test]
    fn test_only_abnormal_values_are_shown() {
        let mut filter = StatusFilter::new(MOTOR_STATUS, &[], false);
        assert_eq!(filter.filter("Motor[1].AmpEna", &value("1")), None);
        assert_eq!(filter.filter("Motor[1].AmpFault", &value("1")), Some("1".into()));
        // no known normal value
        assert_eq!(filter.filter("Motor[1].InPos", &value("0")), Some("0".into()));
        // unparsable values are shown
        assert_eq!(filter.filter("Motor[1].AmpEna", &value("x")), Some("x".into()));
    }

    #[test]
    fn test_return_to_normal_is_reported() {
        let mut filter = StatusFilter::new(MOTOR_STATUS, &[], false);
        assert_eq!(filter.filter("Motor[1].FeFatal", &value("0")), None);
        assert_eq!(filter.filter("Motor[1].FeFatal", &value("1")), Some("1".into()));
        assert_eq!(filter.filter("Motor[1].FeFatal", &value("0")), Some("0".into()));
    }

    #[test]
    fn test_additional_nested_element() {
        let mut filter = StatusFilter::new(MOTOR_STATUS, &["Servo.Kp".to_string()], false);
        assert_eq!(filter.filter("Motor[1].Servo.Kp", &value("0")), Some("0".into()));
    }

    #[test]
    fn test_all_and_additional() {
        let mut filter = StatusFilter::new(COORD_STATUS, &["ClosedLoop".to_string()], false);
        assert_eq!(filter.filter("Coord[1].ClosedLoop", &value("1")), Some("1".into()));
        assert_eq!(filter.filter("Coord[1].AmpEna", &value("1")), None);

        let mut filter = StatusFilter::new(COORD_STATUS, &[], true);
        assert_eq!(filter.filter("Coord[1].AmpEna", &value("1")), Some("1".into()));
    }

    #[test]
    fn test_errors_pass_through() {
        let mut filter = StatusFilter::new(MOTOR_STATUS, &[], false);
        let err = VarValue::Error("error #20: ILLEGAL CMD".into());
        assert_eq!(
            filter.filter("Motor[1].AmpEna", &err),
            Some("Error: error #20: ILLEGAL CMD".into())
        );
    }

    #[test]
    fn test_coord_error_lookup() {
        assert!(coord_error(7).is_some());
        assert!(coord_error(0).is_none());
        assert!(coord_error(999).is_none());
    }
}

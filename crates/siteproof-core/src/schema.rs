//! Fixed key schema for structured extraction (power and site readiness).

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Number,
    Bool,
}

impl ValueType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub key: &'static str,
    pub value_type: ValueType,
    pub unit: Option<&'static str>,
}

const fn string(key: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        value_type: ValueType::String,
        unit: None,
    }
}

const fn flag(key: &'static str) -> FieldSpec {
    FieldSpec {
        key,
        value_type: ValueType::Bool,
        unit: None,
    }
}

const fn number(key: &'static str, unit: Option<&'static str>) -> FieldSpec {
    FieldSpec {
        key,
        value_type: ValueType::Number,
        unit,
    }
}

pub const FIELDS: &[FieldSpec] = &[
    // Identity
    string("doc_title"),
    string("doc_type"),
    string("project_name"),
    string("site_name"),
    string("utility_name"),
    string("developer_name"),
    string("owner_name"),
    // Location and parcel
    string("site_address"),
    string("city"),
    string("state"),
    string("zip_code"),
    string("county"),
    string("apn_parcel_id"),
    number("parcel_count", None),
    number("latitude", Some("deg")),
    number("longitude", Some("deg")),
    number("site_area", Some("ac")),
    number("buildable_area", Some("ac")),
    // Zoning and permitting
    string("zoning_designation"),
    flag("zoning_allows_energy_storage"),
    flag("conditional_use_permit_required"),
    string("permitting_authority"),
    flag("fire_marshal_required"),
    flag("environmental_review_required"),
    number("setback_requirement", Some("ft")),
    string("flood_zone"),
    flag("wetlands_present"),
    flag("hazmat_risk_present"),
    number("noise_limit", Some("dBA")),
    // Existing electrical service
    number("service_voltage", Some("kV")),
    string("service_phase"),
    flag("service_three_phase_available"),
    number("service_capacity_existing", Some("kW")),
    flag("service_capacity_upgrade_possible"),
    flag("meter_present"),
    string("service_drop_type"),
    flag("main_switchgear_present"),
    number("switchgear_rating", Some("A")),
    number("breaker_rating", Some("A")),
    flag("power_quality_issues_reported"),
    // Transformer, substation, feeder
    flag("transformer_present"),
    number("transformer_count", None),
    number("transformer_kva", Some("kVA")),
    number("transformer_primary_voltage", Some("kV")),
    number("transformer_secondary_voltage", Some("V")),
    string("substation_name"),
    number("substation_distance", Some("mi")),
    string("feeder_id"),
    string("circuit_id"),
    string("interconnection_point"),
    number("interconnect_voltage", Some("kV")),
    number("available_capacity", Some("MW")),
    flag("thermal_limit_binding"),
    flag("voltage_limit_binding"),
    flag("protection_upgrade_required"),
    // Interconnection queue
    string("interconnection_request_id"),
    string("queue_position"),
    string("study_stage"),
    string("study_date"),
    number("estimated_upgrade_cost", Some("USD")),
    number("upgrade_cost_range_low", Some("USD")),
    number("upgrade_cost_range_high", Some("USD")),
    number("estimated_timeline_months", Some("mo")),
    flag("utility_construction_required"),
    flag("network_upgrade_required"),
    flag("distribution_upgrade_required"),
    // Load
    number("annual_energy_kwh", Some("kWh")),
    number("monthly_energy_kwh", Some("kWh")),
    number("peak_demand_kw", Some("kW")),
    number("average_demand_kw", Some("kW")),
    number("load_factor", None),
    string("rate_tariff"),
    // Storage and generation equipment
    flag("bess_present"),
    number("bess_power_mw", Some("MW")),
    number("bess_energy_mwh", Some("MWh")),
    number("inverter_count", None),
    number("inverter_rating_kw", Some("kW")),
    flag("pcs_present"),
    flag("generator_present"),
    number("generator_count", None),
    number("generator_power_kw", Some("kW")),
    string("fuel_type"),
    // Constructability
    flag("site_access_road_present"),
    flag("truck_access_possible"),
    flag("crane_access_possible"),
    flag("fence_present"),
    flag("site_secured"),
    flag("grading_required"),
    number("slope_percent", Some("%")),
    // Notes
    string("summary"),
    string("red_flags"),
    string("next_steps"),
];

#[must_use]
pub fn field(key: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.key == key)
}

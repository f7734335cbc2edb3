//! Roles, organizations, and the role→organization admission table.
//!
//! Every user belongs to exactly one organization, determined by role.
//! The gateway enforces the admission table before enrolment; the chaincode
//! re-derives role and user id from the endorsing certificate.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CustodyError;

/// Role a user holds across the whole system.
///
/// The custodian-facing subset (`SELLER`, `DELIVERY_PERSON`, `CUSTOMER`) is
/// the only set valid for `currentCustodianRole`; `ADMIN` is read-only by
/// design and never appears in custody fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Seller,
    DeliveryPerson,
    Admin,
}

impl Role {
    /// The organization this role enrolls with.
    pub fn organization(&self) -> Organization {
        match self {
            Role::Customer | Role::Admin => Organization::Platform,
            Role::Seller => Organization::Sellers,
            Role::DeliveryPerson => Organization::Logistics,
        }
    }

    /// Whether the role may hold physical custody of a package.
    pub fn is_custodial(&self) -> bool {
        matches!(self, Role::Customer | Role::Seller | Role::DeliveryPerson)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Seller => "SELLER",
            Role::DeliveryPerson => "DELIVERY_PERSON",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CustodyError> {
        match s {
            "CUSTOMER" => Ok(Role::Customer),
            "SELLER" => Ok(Role::Seller),
            "DELIVERY_PERSON" => Ok(Role::DeliveryPerson),
            "ADMIN" => Ok(Role::Admin),
            other => Err(CustodyError::InvalidArgument {
                field: "role".to_string(),
                reason: format!("unknown role '{}'", other),
            }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three mutually-distrusting organizations operating the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Organization {
    Platform,
    Sellers,
    Logistics,
}

impl Organization {
    pub const ALL: [Organization; 3] = [
        Organization::Platform,
        Organization::Sellers,
        Organization::Logistics,
    ];

    /// Human-readable organization name as used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Organization::Platform => "PlatformOrg",
            Organization::Sellers => "SellersOrg",
            Organization::Logistics => "LogisticsOrg",
        }
    }

    /// The organization's membership service provider id.
    pub fn msp_id(&self) -> &'static str {
        match self {
            Organization::Platform => "PlatformOrgMSP",
            Organization::Sellers => "SellersOrgMSP",
            Organization::Logistics => "LogisticsOrgMSP",
        }
    }

    /// Roles this organization's CA will enroll.
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Organization::Platform => &[Role::Customer, Role::Admin],
            Organization::Sellers => &[Role::Seller],
            Organization::Logistics => &[Role::DeliveryPerson],
        }
    }

    pub fn accepts(&self, role: Role) -> bool {
        self.allowed_roles().contains(&role)
    }

    pub fn parse(s: &str) -> Result<Self, CustodyError> {
        match s {
            "PlatformOrg" => Ok(Organization::Platform),
            "SellersOrg" => Ok(Organization::Sellers),
            "LogisticsOrg" => Ok(Organization::Logistics),
            other => Err(CustodyError::InvalidArgument {
                field: "organization".to_string(),
                reason: format!("unknown organization '{}'", other),
            }),
        }
    }

    /// Resolve an organization from its MSP id.
    pub fn from_msp_id(msp: &str) -> Option<Self> {
        Organization::ALL.iter().copied().find(|o| o.msp_id() == msp)
    }
}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Attributes embedded in an issued certificate, readable by the chaincode
/// during endorsement. The request path never passes identity as plain
/// arguments; these attributes are the only source of caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertAttributes {
    pub user_id: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_to_org_mapping() {
        assert_eq!(Role::Customer.organization(), Organization::Platform);
        assert_eq!(Role::Admin.organization(), Organization::Platform);
        assert_eq!(Role::Seller.organization(), Organization::Sellers);
        assert_eq!(Role::DeliveryPerson.organization(), Organization::Logistics);
    }

    #[test]
    fn org_admission_is_inverse_of_role_mapping() {
        for org in Organization::ALL {
            for role in org.allowed_roles() {
                assert_eq!(role.organization(), org);
            }
        }
        assert!(!Organization::Sellers.accepts(Role::Customer));
        assert!(!Organization::Logistics.accepts(Role::Admin));
    }

    #[test]
    fn role_serde_wire_names() {
        let json = serde_json::to_string(&Role::DeliveryPerson).unwrap();
        assert_eq!(json, "\"DELIVERY_PERSON\"");
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::DeliveryPerson);
    }

    #[test]
    fn role_parse_rejects_unknown() {
        assert!(Role::parse("COURIER").is_err());
    }

    #[test]
    fn msp_roundtrip() {
        for org in Organization::ALL {
            assert_eq!(Organization::from_msp_id(org.msp_id()), Some(org));
        }
        assert_eq!(Organization::from_msp_id("OtherMSP"), None);
    }
}

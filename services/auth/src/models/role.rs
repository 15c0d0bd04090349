//! Role permission matrix embedded in session claims

use super::user::UserRole;

const PROPERTIES_READ: &str = "properties:read";
const PROPERTIES_WRITE: &str = "properties:write";
const TENANTS_READ: &str = "tenants:read";
const TENANTS_WRITE: &str = "tenants:write";
const PAYMENTS_READ: &str = "payments:read";
const PAYMENTS_RECONCILE: &str = "payments:reconcile";
const PAYBILL_MANAGE: &str = "paybill:manage";
const MAINTENANCE_READ: &str = "maintenance:read";
const MAINTENANCE_WRITE: &str = "maintenance:write";
const USERS_MANAGE: &str = "users:manage";
const CHAT: &str = "chat:use";

impl UserRole {
    /// Permissions granted to the role
    pub fn permissions(&self) -> Vec<String> {
        let granted: &[&str] = match self {
            UserRole::SuperAdmin | UserRole::AgencyAdmin | UserRole::Landlord => &[
                PROPERTIES_READ,
                PROPERTIES_WRITE,
                TENANTS_READ,
                TENANTS_WRITE,
                PAYMENTS_READ,
                PAYMENTS_RECONCILE,
                PAYBILL_MANAGE,
                MAINTENANCE_READ,
                MAINTENANCE_WRITE,
                USERS_MANAGE,
                CHAT,
            ],
            UserRole::Agent => &[
                PROPERTIES_READ,
                PROPERTIES_WRITE,
                TENANTS_READ,
                TENANTS_WRITE,
                PAYMENTS_READ,
                PAYMENTS_RECONCILE,
                MAINTENANCE_READ,
                MAINTENANCE_WRITE,
                CHAT,
            ],
            UserRole::Caretaker => &[
                PROPERTIES_READ,
                TENANTS_READ,
                MAINTENANCE_READ,
                MAINTENANCE_WRITE,
                CHAT,
            ],
            UserRole::Tenant => &[PAYMENTS_READ, MAINTENANCE_READ, MAINTENANCE_WRITE, CHAT],
        };

        granted.iter().map(|p| p.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_company_owners_manage_paybills() {
        let manages = |role: UserRole| role.permissions().iter().any(|p| p == PAYBILL_MANAGE);
        assert!(manages(UserRole::Landlord));
        assert!(manages(UserRole::AgencyAdmin));
        assert!(!manages(UserRole::Agent));
        assert!(!manages(UserRole::Tenant));
    }

    #[test]
    fn tenants_cannot_reconcile() {
        let permissions = UserRole::Tenant.permissions();
        assert!(!permissions.iter().any(|p| p == PAYMENTS_RECONCILE));
    }
}

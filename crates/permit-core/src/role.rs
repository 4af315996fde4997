//! Roles and the permissions they grant.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The role attached to a user account.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  /// Members of the public; assigned on self-registration.
  #[default]
  Citizen,
  /// Council officers who process applications.
  Staff,
  Admin,
}

/// Something an authenticated caller may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
  ViewOwnApplications,
  ViewAllApplications,
  ReviewApplications,
  ViewAllUsers,
  ManageUsers,
}

impl Role {
  pub fn grants(self, permission: Permission) -> bool {
    use Permission::*;
    match self {
      Role::Admin => true,
      Role::Staff => matches!(
        permission,
        ViewOwnApplications
          | ViewAllApplications
          | ReviewApplications
          | ViewAllUsers
      ),
      Role::Citizen => {
        matches!(permission, ViewOwnApplications)
      }
    }
  }
}

/// Anything that carries a role can be asked whether it may do something.
pub trait Authorize {
  fn role(&self) -> Role;

  fn can(&self, permission: Permission) -> bool { self.role().grants(permission) }
}

impl Authorize for Role {
  fn role(&self) -> Role { *self }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn citizens_cannot_review() {
    assert!(Role::Citizen.can(Permission::ViewOwnApplications));
    assert!(!Role::Citizen.can(Permission::ReviewApplications));
    assert!(!Role::Citizen.can(Permission::ViewAllUsers));
  }

  #[test]
  fn staff_review_but_do_not_manage_users() {
    assert!(Role::Staff.can(Permission::ReviewApplications));
    assert!(Role::Staff.can(Permission::ViewAllUsers));
    assert!(!Role::Staff.can(Permission::ManageUsers));
  }

  #[test]
  fn admin_can_do_everything() {
    for p in [
      Permission::ViewOwnApplications,
      Permission::ViewAllApplications,
      Permission::ReviewApplications,
      Permission::ViewAllUsers,
      Permission::ManageUsers,
    ] {
      assert!(Role::Admin.can(p));
    }
  }

  #[test]
  fn string_forms_agree() {
    assert_eq!(Role::Staff.to_string(), "staff");
    assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    assert_eq!(serde_json::to_string(&Role::Citizen).unwrap(), "\"citizen\"");
  }
}

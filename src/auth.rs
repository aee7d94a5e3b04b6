use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// Login name that gets the admin role. Every other name is a guest.
pub const ADMIN_USER: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Guest,
}

impl Role {
    pub fn for_user(user: Option<&str>) -> Role {
        if user == Some(ADMIN_USER) { Role::Admin } else { Role::Guest }
    }
}

#[derive(Debug)]
pub struct VillettaAuthSource {
    admin_password: String,
    guest_password: String,
}

impl VillettaAuthSource {
    pub fn new(admin_password: String, guest_password: String) -> Self {
        Self {
            admin_password,
            guest_password,
        }
    }

    pub fn password_for(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.admin_password,
            Role::Guest => &self.guest_password,
        }
    }
}

#[async_trait]
impl AuthSource for VillettaAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let role = Role::for_user(login.user().as_deref());
        Ok(Password::new(None, self.password_for(role).as_bytes().to_vec()))
    }
}

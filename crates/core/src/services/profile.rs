//! Staff profile resolution.

use mozo_common::{AppError, AppResult};
use mozo_db::{
    entities::{admin_profile, user, waiter_profile},
    repositories::StaffProfileRepository,
};
use serde::Serialize;

/// The role-specific profile of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "profile", rename_all = "lowercase")]
pub enum Profile {
    Admin(admin_profile::Model),
    Waiter(waiter_profile::Model),
    /// No profile, or a deactivated waiter.
    None,
}

impl Profile {
    #[must_use]
    pub fn business_id(&self) -> Option<&str> {
        match self {
            Self::Admin(p) => Some(&p.business_id),
            Self::Waiter(p) => Some(&p.business_id),
            Self::None => None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Admin(p) => Some(&p.display_name),
            Self::Waiter(p) => Some(&p.display_name),
            Self::None => None,
        }
    }
}

/// An authenticated user together with their resolved profile.
#[derive(Debug, Clone)]
pub struct Staff {
    pub user: user::Model,
    pub profile: Profile,
}

impl Staff {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.user.id
    }

    #[must_use]
    pub fn business_id(&self) -> &str {
        &self.user.business_id
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.profile, Profile::Admin(_))
    }

    #[must_use]
    pub const fn is_waiter(&self) -> bool {
        matches!(self.profile, Profile::Waiter(_))
    }

    /// Name shown to customers and colleagues.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.profile.display_name().unwrap_or(&self.user.name)
    }

    /// Reject users without a usable profile.
    pub fn ensure_profile(&self) -> AppResult<()> {
        if matches!(self.profile, Profile::None) {
            return Err(AppError::Forbidden("No staff profile".to_string()));
        }
        Ok(())
    }

    /// Reject access to another business.
    pub fn ensure_business(&self, business_id: &str) -> AppResult<()> {
        self.ensure_profile()?;
        if self.business_id() != business_id {
            return Err(AppError::Forbidden(
                "Resource belongs to another business".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ensure_admin(&self) -> AppResult<()> {
        if !self.is_admin() {
            return Err(AppError::Forbidden("Admin profile required".to_string()));
        }
        Ok(())
    }

    pub fn ensure_waiter(&self) -> AppResult<()> {
        if !self.is_waiter() {
            return Err(AppError::Forbidden("Waiter profile required".to_string()));
        }
        Ok(())
    }
}

/// Resolves the profile matching a user's role.
#[derive(Clone)]
pub struct ProfileService {
    repo: StaffProfileRepository,
}

impl ProfileService {
    #[must_use]
    pub const fn new(repo: StaffProfileRepository) -> Self {
        Self { repo }
    }

    /// Look up the profile for the user's role.
    ///
    /// A profile that points at another business than the user is ignored.
    pub async fn resolve(&self, user: &user::Model) -> AppResult<Profile> {
        let profile = match user.role {
            user::UserRole::Admin => self
                .repo
                .find_admin_by_user_id(&user.id)
                .await?
                .map_or(Profile::None, Profile::Admin),
            user::UserRole::Waiter => self
                .repo
                .find_waiter_by_user_id(&user.id)
                .await?
                .filter(|p| p.is_active)
                .map_or(Profile::None, Profile::Waiter),
        };

        if profile
            .business_id()
            .is_some_and(|business_id| business_id != user.business_id)
        {
            tracing::warn!(user_id = %user.id, "Profile business does not match user");
            return Ok(Profile::None);
        }

        Ok(profile)
    }

    /// Resolve a user into a [`Staff`].
    pub async fn staff(&self, user: user::Model) -> AppResult<Staff> {
        let profile = self.resolve(&user).await?;
        Ok(Staff { user, profile })
    }

    /// Display name of a waiter, if they have a profile.
    pub async fn waiter_name(&self, user_id: &str) -> AppResult<Option<String>> {
        Ok(self
            .repo
            .find_waiter_by_user_id(user_id)
            .await?
            .map(|p| p.display_name))
    }

    /// User IDs of the active waiters of a business.
    pub async fn active_waiter_ids(&self, business_id: &str) -> AppResult<Vec<String>> {
        Ok(self
            .repo
            .find_active_waiters_by_business(business_id)
            .await?
            .into_iter()
            .map(|p| p.user_id)
            .collect())
    }
}

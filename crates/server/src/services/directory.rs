//! User directory: login, provisioning and role-scoped user management.

use std::collections::BTreeSet;

use tracing::instrument;

use atelier_core::{Role, ShopId, UserId};

use super::credentials::{CredentialError, CredentialService, Identity};
use super::error::ServiceError;
use super::policy::{Action, Scope, authorize};
use super::queries::populate;
use super::settle;
use crate::db::{EntityStore, RepositoryError, StoreTransaction};
use crate::models::{
    AccessChangeRequest, CreateUserRequest, LoginRequest, LoginResponse, NewUser, OrderFilter,
    PasswordResetRequest, UpdateUserRequest, User, UserFilter, UserProfile, UserView,
};

const BAD_LOGIN: &str = "invalid username or password";

/// User directory service.
pub struct DirectoryService<'a> {
    store: &'a dyn EntityStore,
    credentials: &'a CredentialService,
}

impl<'a> DirectoryService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn EntityStore, credentials: &'a CredentialService) -> Self {
        Self { store, credentials }
    }

    /// Exchange a username and password for a token.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated` for an unknown user or a wrong password alike.
    #[instrument(skip_all, fields(username = %request.username))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ServiceError> {
        let username = request.username.trim().to_lowercase();

        let mut tx = self.store.begin().await?;
        let result = tx
            .find_user_by_username(&username)
            .await
            .map_err(ServiceError::from);
        let Some(user) = settle(tx, result).await? else {
            CredentialService::verify_unknown_user(&request.password);
            return Err(ServiceError::Unauthenticated(BAD_LOGIN.to_owned()));
        };

        CredentialService::verify_password(&request.password, &user.password_hash).map_err(
            |_| {
                tracing::info!(user_id = %user.id, "Login rejected");
                ServiceError::Unauthenticated(BAD_LOGIN.to_owned())
            },
        )?;

        let token = self
            .credentials
            .issue(&Identity::from(&user))
            .map_err(credential_failure)?;
        tracing::info!(user_id = %user.id, "Login succeeded");

        Ok(LoginResponse {
            token,
            user: UserView::from(&user),
        })
    }

    /// The caller's own profile with the orders they created.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the account was deleted after the token was issued.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn me(&self, identity: &Identity) -> Result<UserProfile, ServiceError> {
        let mut tx = self.store.begin().await?;
        let result = profile_in(tx.as_mut(), identity, identity.user_id).await;
        settle(tx, result).await
    }

    /// Fetch one user with the orders they created that the caller may see.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` before `Unauthorized`.
    #[instrument(skip_all, fields(user_id = %identity.user_id, target = %id))]
    pub async fn get(&self, identity: &Identity, id: UserId) -> Result<UserProfile, ServiceError> {
        let mut tx = self.store.begin().await?;
        let result = profile_in(tx.as_mut(), identity, id).await;
        settle(tx, result).await
    }

    /// List users visible to the caller.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for the User role.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn list(&self, identity: &Identity) -> Result<Vec<UserView>, ServiceError> {
        self.find(identity, None).await
    }

    /// Search visible users by name.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank name and `Unauthorized` for the User role.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn search(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<Vec<UserView>, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation(
                "search term cannot be empty".to_owned(),
            ));
        }
        self.find(identity, Some(name.to_owned())).await
    }

    /// Shops the caller can work with.
    ///
    /// Admins get every shop assigned to any user; everyone else gets their own.
    ///
    /// # Errors
    ///
    /// Returns `TransactionFailure` if the store cannot be read.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn shops(&self, identity: &Identity) -> Result<Vec<ShopId>, ServiceError> {
        if identity.role != Role::Admin {
            return Ok(identity.shops.iter().cloned().collect());
        }
        let mut tx = self.store.begin().await?;
        let result = tx.distinct_shops().await.map_err(ServiceError::from);
        settle(tx, result).await
    }

    /// Create a user on behalf of `identity`.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` per policy, plus everything [`provision`] returns.
    #[instrument(skip_all, fields(user_id = %identity.user_id, role = %request.role))]
    pub async fn create(
        &self,
        identity: &Identity,
        request: CreateUserRequest,
    ) -> Result<UserView, ServiceError> {
        authorize(
            identity,
            Action::CreateUser {
                role: request.role,
                shops: &request.shops,
            },
        )
        .into_result()?;
        provision(self.store, request).await
    }

    /// Change a user's name and/or email.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty request, `NotFound`, `Unauthorized`,
    /// and `Conflict` for a taken email.
    #[instrument(skip_all, fields(user_id = %identity.user_id, target = %id))]
    pub async fn update(
        &self,
        identity: &Identity,
        id: UserId,
        request: UpdateUserRequest,
    ) -> Result<UserView, ServiceError> {
        if request.name.is_none() && request.email.is_none() {
            return Err(ServiceError::Validation("no fields to update".to_owned()));
        }
        let name = request.name.as_deref().map(required_name).transpose()?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut user = load(tx.as_mut(), id).await?;
            authorize(identity, Action::ManageUser(&user)).into_result()?;
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(email) = request.email {
                user.email = email;
            }
            save(tx.as_mut(), &user).await
        }
        .await;
        let user = settle(tx, result).await?;
        Ok(UserView::from(&user))
    }

    /// Replace a user's password.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a weak password (checked first), then
    /// `NotFound` or `Unauthorized`.
    #[instrument(skip_all, fields(user_id = %identity.user_id, target = %id))]
    pub async fn reset_password(
        &self,
        identity: &Identity,
        id: UserId,
        request: PasswordResetRequest,
    ) -> Result<(), ServiceError> {
        // Hashing takes long enough that it must not hold a transaction open
        let password_hash = hash(&request.new_password)?;

        let mut tx = self.store.begin().await?;
        let result = async {
            let mut user = load(tx.as_mut(), id).await?;
            authorize(identity, Action::ManageUser(&user)).into_result()?;
            user.password_hash = password_hash;
            save(tx.as_mut(), &user).await
        }
        .await;
        settle(tx, result).await?;

        tracing::info!("Password reset");
        Ok(())
    }

    /// Set a user's role and shops. Admin only.
    ///
    /// Takes effect at the user's next login.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Unauthorized`, or `Validation` for a role/shop mismatch.
    #[instrument(skip_all, fields(user_id = %identity.user_id, target = %id, role = %request.role))]
    pub async fn change_access(
        &self,
        identity: &Identity,
        id: UserId,
        request: AccessChangeRequest,
    ) -> Result<UserView, ServiceError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut user = load(tx.as_mut(), id).await?;
            authorize(identity, Action::ChangeAccess(&user)).into_result()?;
            check_access(request.role, &request.shops)?;
            user.role = request.role;
            user.shops = request.shops;
            save(tx.as_mut(), &user).await
        }
        .await;
        let user = settle(tx, result).await?;
        Ok(UserView::from(&user))
    }

    /// Delete a user. Admin only, and only once they have no orders.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Unauthorized`, `Validation` when deleting oneself,
    /// and `Conflict` while the user still has orders.
    #[instrument(skip_all, fields(user_id = %identity.user_id, target = %id))]
    pub async fn delete(&self, identity: &Identity, id: UserId) -> Result<(), ServiceError> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let user = load(tx.as_mut(), id).await?;
            authorize(identity, Action::DeleteUser(&user)).into_result()?;
            if user.id == identity.user_id {
                return Err(ServiceError::Validation(
                    "you cannot delete your own account".to_owned(),
                ));
            }
            if !user.orders.is_empty() {
                return Err(ServiceError::conflict(format!(
                    "user still has {} orders",
                    user.orders.len()
                )));
            }
            tx.delete_user(id).await.map_err(ServiceError::from)
        }
        .await;
        settle(tx, result).await?;

        tracing::info!("User deleted");
        Ok(())
    }

    async fn find(
        &self,
        identity: &Identity,
        name_contains: Option<String>,
    ) -> Result<Vec<UserView>, ServiceError> {
        let filter = match authorize(identity, Action::ReadUsers).into_result()? {
            Scope::Unrestricted => UserFilter {
                name_contains,
                ..UserFilter::default()
            },
            Scope::Shops(shops) => UserFilter {
                sharing_shops: Some(shops),
                exclude_role: Some(Role::Admin),
                name_contains,
                ..UserFilter::default()
            },
        };

        let mut tx = self.store.begin().await?;
        let result = tx.find_users(&filter).await.map_err(ServiceError::from);
        let users = settle(tx, result).await?;
        Ok(users.iter().map(UserView::from).collect())
    }
}

/// Create a user without an authorization check.
///
/// For trusted callers such as the command line, where no identity exists yet.
/// The username is derived from the name.
///
/// # Errors
///
/// Returns `Validation` for a blank name, a weak password or a role/shop
/// mismatch, and `Conflict` for a taken email.
pub async fn provision(
    store: &dyn EntityStore,
    request: CreateUserRequest,
) -> Result<UserView, ServiceError> {
    let name = required_name(&request.name)?;
    check_access(request.role, &request.shops)?;
    let password_hash = hash(&request.password)?;

    let mut tx = store.begin().await?;
    let result = create_in(
        tx.as_mut(),
        NewUser {
            username: String::new(),
            name,
            email: request.email,
            password_hash,
            role: request.role,
            shops: request.shops,
        },
    )
    .await;
    let user = settle(tx, result).await?;

    tracing::info!(new_user = %user.id, username = %user.username, "User created");
    Ok(UserView::from(&user))
}

fn hash(password: &str) -> Result<String, ServiceError> {
    CredentialService::hash_password(password).map_err(credential_failure)
}

fn credential_failure(err: CredentialError) -> ServiceError {
    match err {
        CredentialError::WeakPassword => ServiceError::Validation(err.to_string()),
        CredentialError::PasswordHash | CredentialError::InvalidToken(_) => {
            tracing::error!(error = %err, "Credential operation failed");
            ServiceError::Internal(err.to_string())
        }
        CredentialError::InvalidCredentials => ServiceError::Unauthenticated(BAD_LOGIN.to_owned()),
    }
}

fn required_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::Validation("name cannot be blank".to_owned()));
    }
    Ok(name.to_owned())
}

/// Admins have no shops; everyone else needs at least one.
fn check_access(role: Role, shops: &BTreeSet<ShopId>) -> Result<(), ServiceError> {
    match (role.requires_shops(), shops.is_empty()) {
        (true, true) => Err(ServiceError::Validation(format!(
            "a {role} must be assigned at least one shop"
        ))),
        (false, false) => Err(ServiceError::Validation(
            "an Admin cannot be assigned shops".to_owned(),
        )),
        _ => Ok(()),
    }
}

/// Lowercased name with whitespace removed.
fn base_username(name: &str) -> String {
    let base: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    if base.is_empty() { "user".to_owned() } else { base }
}

async fn load(tx: &mut dyn StoreTransaction, id: UserId) -> Result<User, ServiceError> {
    tx.find_user(id).await?.ok_or(ServiceError::NotFound("user"))
}

async fn save(tx: &mut dyn StoreTransaction, user: &User) -> Result<User, ServiceError> {
    tx.update_user(user).await.map_err(email_conflict)
}

fn email_conflict(err: RepositoryError) -> ServiceError {
    match err {
        RepositoryError::Conflict(_) => ServiceError::conflict("email already in use"),
        other => other.into(),
    }
}

async fn create_in(
    tx: &mut dyn StoreTransaction,
    mut user: NewUser,
) -> Result<User, ServiceError> {
    if tx.find_user_by_email(&user.email).await?.is_some() {
        return Err(ServiceError::conflict("email already in use"));
    }

    let base = base_username(&user.name);
    let mut username = base.clone();
    let mut counter = 1_u32;
    while tx.find_user_by_username(&username).await?.is_some() {
        username = format!("{base}{counter}");
        counter += 1;
    }
    user.username = username;

    tx.insert_user(&user).await.map_err(ServiceError::from)
}

async fn profile_in(
    tx: &mut dyn StoreTransaction,
    identity: &Identity,
    id: UserId,
) -> Result<UserProfile, ServiceError> {
    let user = load(tx, id).await?;
    let scope = authorize(identity, Action::ReadUser(&user)).into_result()?;

    // A user always sees their own orders, even in shops they have since left.
    let shops = if user.id == identity.user_id {
        None
    } else {
        scope.shops().cloned()
    };
    let orders = tx
        .find_orders(&OrderFilter {
            ids: Some(user.orders.clone()),
            shops,
            ..OrderFilter::default()
        })
        .await?;

    Ok(UserProfile {
        user: UserView::from(&user),
        order_details: populate(tx, orders).await?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use secrecy::SecretString;

    use atelier_core::Email;

    use super::*;
    use crate::db::MemoryStore;
    use crate::services::ErrorKind;

    fn credentials() -> CredentialService {
        CredentialService::new(
            &SecretString::from("k7$Qp2!vX9mZ#rT4wB8nL1@cF6hJ3sD0"),
            Duration::hours(1),
        )
    }

    fn admin() -> Identity {
        Identity {
            user_id: UserId::new(999),
            role: Role::Admin,
            shops: BTreeSet::new(),
        }
    }

    fn request(name: &str, email: &str, role: Role, shops: &[&str]) -> CreateUserRequest {
        CreateUserRequest {
            name: name.to_owned(),
            email: Email::parse(email).unwrap(),
            password: "tailor-made-42".to_owned(),
            role,
            shops: shops.iter().map(|s| ShopId::parse(s).unwrap()).collect(),
        }
    }

    #[test]
    fn test_base_username() {
        assert_eq!(base_username("Ravi  Kumar"), "ravikumar");
        assert_eq!(base_username(" \t "), "user");
    }

    #[test]
    fn test_check_access() {
        let s1 = BTreeSet::from([ShopId::parse("S1").unwrap()]);
        assert!(check_access(Role::Admin, &BTreeSet::new()).is_ok());
        assert!(check_access(Role::Admin, &s1).is_err());
        assert!(check_access(Role::User, &BTreeSet::new()).is_err());
        assert!(check_access(Role::Manager, &s1).is_ok());
    }

    #[tokio::test]
    async fn test_usernames_get_numeric_suffix() {
        let store = MemoryStore::new();
        let creds = credentials();
        let directory = DirectoryService::new(&store, &creds);

        let first = directory
            .create(&admin(), request("Ravi Kumar", "a@x.test", Role::User, &["S1"]))
            .await
            .unwrap();
        let second = directory
            .create(&admin(), request("ravi kumar", "b@x.test", Role::User, &["S1"]))
            .await
            .unwrap();
        assert_eq!(first.username, "ravikumar");
        assert_eq!(second.username, "ravikumar1");
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let creds = credentials();
        let directory = DirectoryService::new(&store, &creds);

        directory
            .create(&admin(), request("Ravi", "a@x.test", Role::User, &["S1"]))
            .await
            .unwrap();
        let err = directory
            .create(&admin(), request("Meena", "A@X.test", Role::User, &["S1"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_login_does_not_reveal_unknown_users() {
        let store = MemoryStore::new();
        let creds = credentials();
        let directory = DirectoryService::new(&store, &creds);
        directory
            .create(&admin(), request("Ravi", "a@x.test", Role::User, &["S1"]))
            .await
            .unwrap();

        let login = |username: &str, password: &str| LoginRequest {
            username: username.to_owned(),
            password: password.to_owned(),
        };
        let unknown = directory.login(login("nobody", "tailor-made-42")).await.unwrap_err();
        let wrong = directory.login(login("ravi", "wrong-password")).await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(wrong.kind(), ErrorKind::Unauthenticated);

        let ok = directory.login(login("Ravi", "tailor-made-42")).await.unwrap();
        let identity = creds.decode(&ok.token).unwrap();
        assert_eq!(identity.role, Role::User);
        assert_eq!(ok.user.username, "ravi");
    }

    #[tokio::test]
    async fn test_unknown_username_costs_a_verification() {
        let store = MemoryStore::new();
        let creds = credentials();
        let directory = DirectoryService::new(&store, &creds);
        directory
            .create(&admin(), request("Ravi", "a@x.test", Role::User, &["S1"]))
            .await
            .unwrap();
        let login = |username: &str| LoginRequest {
            username: username.to_owned(),
            password: "wrong-password".to_owned(),
        };
        // Warm up the stand-in hash so its one-time cost is not measured
        directory.login(login("nobody")).await.unwrap_err();

        let started = std::time::Instant::now();
        directory.login(login("ravi")).await.unwrap_err();
        let wrong_password = started.elapsed();

        let started = std::time::Instant::now();
        directory.login(login("nobody")).await.unwrap_err();
        let unknown_user = started.elapsed();

        assert!(
            unknown_user * 4 >= wrong_password,
            "unknown user took {unknown_user:?}, wrong password {wrong_password:?}"
        );
    }

    #[tokio::test]
    async fn test_reset_password_checks_strength_before_writing() {
        let store = MemoryStore::new();
        let creds = credentials();
        let directory = DirectoryService::new(&store, &creds);
        let user = directory
            .create(&admin(), request("Ravi", "a@x.test", Role::User, &["S1"]))
            .await
            .unwrap();
        let reset = |password: &str| PasswordResetRequest {
            new_password: password.to_owned(),
        };

        let err = directory
            .reset_password(&admin(), user.id, reset("short"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        let login = |password: &str| LoginRequest {
            username: "ravi".to_owned(),
            password: password.to_owned(),
        };
        assert!(directory.login(login("tailor-made-42")).await.is_ok());

        directory
            .reset_password(&admin(), user.id, reset("bespoke-suit-7"))
            .await
            .unwrap();
        assert!(directory.login(login("tailor-made-42")).await.is_err());
        assert!(directory.login(login("bespoke-suit-7")).await.is_ok());
    }

    #[test]
    fn test_credential_failures_map_to_kinds() {
        assert_eq!(
            credential_failure(CredentialError::WeakPassword).kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            credential_failure(CredentialError::PasswordHash).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            credential_failure(CredentialError::InvalidCredentials).kind(),
            ErrorKind::Unauthenticated
        );
    }
}

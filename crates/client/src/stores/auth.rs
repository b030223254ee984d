//! Signed-in user profile.

use std::sync::Arc;

use gruzreis_shared::{AuthSession, UserNotifications, UserRatings};

crate::store_state! {
    pub struct AuthState => AuthField {
        auth: bool => Auth,
        id: Option<String> => Id,
        name: Option<String> => Name,
        phone: Option<String> => Phone,
        email: Option<String> => Email,
        image: Option<String> => Image,
        token: Option<String> => Token,
        user_type: Option<i64> => UserType,
        description: Option<String> => Description,
        ratings: Option<Arc<UserRatings>> => Ratings,
        notifications: Option<Arc<UserNotifications>> => Notifications,
        is_loading: bool => IsLoading,
        error: Option<String> => Error,
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            auth: false,
            id: None,
            name: None,
            phone: None,
            email: None,
            image: None,
            token: None,
            user_type: None,
            description: None,
            ratings: None,
            notifications: None,
            is_loading: false,
            error: None,
        }
    }
}

impl AuthState {
    /// Field updates that install `session` as the signed-in user.
    pub fn session_updates(session: AuthSession) -> Vec<AuthField> {
        vec![
            AuthField::Auth(true),
            AuthField::Id(Some(session.guid)),
            AuthField::Name(Some(session.name)),
            AuthField::Phone(Some(session.phone)),
            AuthField::Email(Some(session.email)),
            AuthField::Image(Some(session.image)),
            AuthField::Token(Some(session.token)),
            AuthField::UserType(Some(session.user_type)),
            AuthField::Description(Some(session.description)),
            AuthField::Ratings(Some(Arc::new(session.ratings))),
            AuthField::Notifications(Some(Arc::new(session.notifications))),
            AuthField::IsLoading(false),
            AuthField::Error(None),
        ]
    }

    /// Field updates that return to the signed-out state.
    pub fn cleared_updates() -> Vec<AuthField> {
        vec![
            AuthField::Auth(false),
            AuthField::Id(None),
            AuthField::Name(None),
            AuthField::Phone(None),
            AuthField::Email(None),
            AuthField::Image(None),
            AuthField::Token(None),
            AuthField::UserType(None),
            AuthField::Description(None),
            AuthField::Ratings(None),
            AuthField::Notifications(None),
            AuthField::IsLoading(false),
        ]
    }
}

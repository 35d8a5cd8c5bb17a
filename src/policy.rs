//! Authorization policy.
//!
//! Every access decision that can refuse a caller goes through [`authorize`]. Anonymous reads
//! and "any active principal" operations need no decision here: the first is open to all and
//! the second is already guaranteed by the `AuthUser` extractor.
//!
//! Resource existence is settled before the call (see [`authorize_post`]), so a missing
//! resource is always reported as not found, even to a caller that would not have been
//! allowed to touch it.

use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{Post, Role},
};

/// An operation together with the resource facts the decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register { requested_role: Role },
    UpdatePost { author_id: Uuid },
    DeletePost { author_id: Uuid },
    /// Any of the moderation endpoints (user listing, deletion and status, any-post removal).
    Administer,
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
}

impl From<Denial> for ApiError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthenticated => ApiError::unauthorized(),
            Denial::Forbidden(reason) => ApiError::Forbidden(reason.to_string()),
            Denial::NotFound(what) => ApiError::NotFound(what.to_string()),
        }
    }
}

/// Which mutation is being attempted on an existing post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Update,
    Delete,
}

/// authorize
///
/// The decision table. `caller` is `None` for anonymous requests.
pub fn authorize(caller: Option<&AuthUser>, operation: Operation) -> Result<(), Denial> {
    match operation {
        // Self-registration can never mint an administrator.
        Operation::Register { requested_role } => match requested_role {
            Role::User => Ok(()),
            Role::Admin => Err(Denial::Forbidden("Cannot self-register as admin")),
        },

        Operation::UpdatePost { author_id } | Operation::DeletePost { author_id } => {
            let caller = caller.ok_or(Denial::Unauthenticated)?;
            if caller.id == author_id || caller.role.is_admin() {
                Ok(())
            } else {
                Err(Denial::Forbidden("Not the author of this post"))
            }
        }

        Operation::Administer => match caller.ok_or(Denial::Unauthenticated)?.role {
            Role::Admin => Ok(()),
            Role::User => Err(Denial::Forbidden("Admin role required")),
        },
    }
}

/// Admin role or `Forbidden`.
pub fn require_admin(caller: &AuthUser) -> Result<(), Denial> {
    authorize(Some(caller), Operation::Administer)
}

/// authorize_post
///
/// Existence first, then ownership. Hands the post back on success so the caller can act on it.
pub fn authorize_post(
    caller: &AuthUser,
    action: PostAction,
    post: Option<Post>,
) -> Result<Post, Denial> {
    let post = post.ok_or(Denial::NotFound("Post not found"))?;
    let operation = match action {
        PostAction::Update => Operation::UpdatePost {
            author_id: post.author_id,
        },
        PostAction::Delete => Operation::DeletePost {
            author_id: post.author_id,
        },
    };
    authorize(Some(caller), operation)?;
    Ok(post)
}

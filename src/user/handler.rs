pub(super) mod api {
    use axum::{
        Extension,
        extract::{Path, Query, State},
    };
    use axum_extra::extract::WithRejection;
    use serde::Deserialize;

    use crate::envelope::Envelope;
    use crate::error::Error;
    use crate::pagination::{Cursor, Page};
    use crate::user::{self, model::FriendDto, model::UserInfo};
    use crate::auth;

    const DEFAULT_LIMIT: usize = 20;

    pub async fn find_one(
        WithRejection(Path(id), _): WithRejection<Path<user::Id>, Error>,
        user_service: State<user::Service>,
    ) -> crate::Result<Envelope<UserInfo>> {
        let info = user_service.get_simple_info(&id).await?;
        Ok(Envelope::ok("user found", info))
    }

    #[derive(Deserialize)]
    pub struct FriendsParams {
        after: Option<String>,
        limit: Option<usize>,
    }

    pub async fn find_friends(
        Extension(auth_user): Extension<auth::User>,
        WithRejection(Query(params), _): WithRejection<Query<FriendsParams>, Error>,
        user_service: State<user::Service>,
    ) -> crate::Result<Envelope<Page<FriendDto, user::Id>>> {
        let cursor = Cursor::from(params.after);
        let page = user_service
            .find_friends(auth_user.id(), &cursor, params.limit.unwrap_or(DEFAULT_LIMIT))
            .await?;

        Ok(Envelope::ok("friends found", page))
    }
}

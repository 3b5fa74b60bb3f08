pub(super) mod api {
    use axum::{
        Extension, Json,
        extract::{Path, State},
    };
    use axum_extra::extract::WithRejection;

    use crate::conversation::{
        self,
        model::{ConversationDto, CreateRequest, MemberRequest, RenameRequest},
    };
    use crate::envelope::Envelope;
    use crate::error::Error;
    use crate::{auth, user};

    pub async fn create(
        Extension(auth_user): Extension<auth::User>,
        conversation_service: State<conversation::Service>,
        WithRejection(Json(req), _): WithRejection<Json<CreateRequest>, Error>,
    ) -> crate::Result<Envelope<ConversationDto>> {
        let participants: Vec<user::Id> = req.participants.into_iter().map(|p| p.id).collect();

        let dto = conversation_service
            .create(&participants, req.name.as_deref(), auth_user.id())
            .await?;

        Ok(Envelope::created("conversation created", dto))
    }

    pub async fn find_all(
        Extension(auth_user): Extension<auth::User>,
        conversation_service: State<conversation::Service>,
    ) -> crate::Result<Envelope<Vec<ConversationDto>>> {
        let dtos = conversation_service.list_for_user(auth_user.id()).await?;
        Ok(Envelope::ok("conversations found", dtos))
    }

    pub async fn find_one(
        Extension(auth_user): Extension<auth::User>,
        WithRejection(Path(id), _): WithRejection<Path<conversation::Id>, Error>,
        conversation_service: State<conversation::Service>,
    ) -> crate::Result<Envelope<ConversationDto>> {
        let dto = conversation_service.find_by_id(&id, auth_user.id()).await?;
        Ok(Envelope::ok("conversation found", dto))
    }

    pub async fn rename(
        Extension(auth_user): Extension<auth::User>,
        WithRejection(Path(id), _): WithRejection<Path<conversation::Id>, Error>,
        conversation_service: State<conversation::Service>,
        WithRejection(Json(req), _): WithRejection<Json<RenameRequest>, Error>,
    ) -> crate::Result<Envelope<()>> {
        conversation_service
            .rename(&id, &req.name, auth_user.id())
            .await?;
        Ok(Envelope::message("conversation renamed"))
    }

    pub async fn switch_admin(
        Extension(auth_user): Extension<auth::User>,
        WithRejection(Path(id), _): WithRejection<Path<conversation::Id>, Error>,
        conversation_service: State<conversation::Service>,
        WithRejection(Json(req), _): WithRejection<Json<MemberRequest>, Error>,
    ) -> crate::Result<Envelope<()>> {
        conversation_service
            .switch_admin(&id, &req.id, auth_user.id())
            .await?;
        Ok(Envelope::message("admin switched"))
    }

    pub async fn add_member(
        Extension(auth_user): Extension<auth::User>,
        WithRejection(Path(id), _): WithRejection<Path<conversation::Id>, Error>,
        conversation_service: State<conversation::Service>,
        WithRejection(Json(req), _): WithRejection<Json<MemberRequest>, Error>,
    ) -> crate::Result<Envelope<()>> {
        conversation_service
            .add_member(&id, &req.id, auth_user.id())
            .await?;
        Ok(Envelope::message("member added"))
    }

    pub async fn remove_member(
        Extension(auth_user): Extension<auth::User>,
        WithRejection(Path((id, user_id)), _): WithRejection<
            Path<(conversation::Id, user::Id)>,
            Error,
        >,
        conversation_service: State<conversation::Service>,
    ) -> crate::Result<Envelope<()>> {
        conversation_service
            .remove_member(&id, &user_id, auth_user.id())
            .await?;
        Ok(Envelope::message("member removed"))
    }

    pub async fn leave(
        Extension(auth_user): Extension<auth::User>,
        WithRejection(Path(id), _): WithRejection<Path<conversation::Id>, Error>,
        conversation_service: State<conversation::Service>,
    ) -> crate::Result<Envelope<()>> {
        conversation_service.leave(&id, auth_user.id()).await?;
        Ok(Envelope::message("left conversation"))
    }
}

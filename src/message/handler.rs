pub(super) mod api {
    use axum::{
        Extension,
        extract::{Multipart, Path, Query, State},
    };
    use axum_extra::extract::WithRejection;
    use serde::Deserialize;

    use crate::envelope::Envelope;
    use crate::error;
    use crate::integration::storage::Image;
    use crate::message::{
        self, Error,
        model::MessageDto,
        service::{DEFAULT_WINDOW_MINUTES, Draft},
    };
    use crate::pagination::{Cursor, Page};
    use crate::{auth, conversation};

    /// Multipart fields: `conversationId`, `type` (`text` or `image`), `text`
    /// and one `images` part per file.
    pub async fn create(
        Extension(auth_user): Extension<auth::User>,
        message_service: State<message::Service>,
        WithRejection(mut multipart, _): WithRejection<Multipart, error::Error>,
    ) -> crate::Result<Envelope<MessageDto>> {
        let mut conversation_id = None;
        let mut kind = None;
        let mut text = None;
        let mut images = vec![];

        while let Some(field) = multipart.next_field().await.map_err(Error::from)? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("conversationId") => {
                    conversation_id = Some(conversation::Id::from(
                        field.text().await.map_err(Error::from)?,
                    ))
                }
                Some("type") => kind = Some(field.text().await.map_err(Error::from)?),
                Some("text") => text = Some(field.text().await.map_err(Error::from)?),
                Some("images") => {
                    let file_name = field.file_name().unwrap_or("image").to_owned();
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_owned();
                    let bytes = field.bytes().await.map_err(Error::from)?;
                    images.push(Image {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
                _ => continue,
            }
        }

        let conversation_id = conversation_id.ok_or(Error::MissingField("conversationId"))?;
        let draft = match kind.as_deref() {
            Some("text") => Draft::Text(text.ok_or(Error::MissingField("text"))?),
            Some("image") => Draft::Images(images),
            Some(other) => return Err(Error::UnsupportedType(other.to_owned()).into()),
            None => return Err(Error::MissingField("type").into()),
        };

        let dto = message_service
            .append(&conversation_id, auth_user.id(), draft)
            .await?;

        Ok(Envelope::created("message sent", dto))
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct FindParams {
        limit_time: Option<u32>,
        after: Option<String>,
    }

    pub async fn find_page(
        Extension(auth_user): Extension<auth::User>,
        WithRejection(Path(conversation_id), _): WithRejection<
            Path<conversation::Id>,
            error::Error,
        >,
        WithRejection(Query(params), _): WithRejection<Query<FindParams>, error::Error>,
        message_service: State<message::Service>,
    ) -> crate::Result<Envelope<Page<MessageDto, message::Id>>> {
        let cursor = Cursor::from(params.after);
        let page = message_service
            .paginate(
                &conversation_id,
                params.limit_time.unwrap_or(DEFAULT_WINDOW_MINUTES),
                &cursor,
                auth_user.id(),
            )
            .await?;

        Ok(Envelope::ok("messages found", page))
    }

    pub async fn mark_seen(
        Extension(auth_user): Extension<auth::User>,
        WithRejection(Path(conversation_id), _): WithRejection<
            Path<conversation::Id>,
            error::Error,
        >,
        message_service: State<message::Service>,
    ) -> crate::Result<Envelope<()>> {
        message_service
            .mark_seen(&conversation_id, auth_user.id())
            .await?;
        Ok(Envelope::message("messages seen"))
    }
}

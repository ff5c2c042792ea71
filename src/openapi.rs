use crate::models::{
    AdminStoryUpdate, Comment, NewComment, NewStory, NewUser, Story, User, Vote,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_stories,
        crate::routes::create_story,
        crate::routes::get_story,
        crate::routes::story_upvote,
        crate::routes::get_story_comments,
        crate::routes::post_comment,
        crate::routes::admin_update_story,
        crate::routes::get_user,
        crate::routes::admin_create_user,
    ),
    components(schemas(
        Story, NewStory, AdminStoryUpdate, Comment, NewComment, User, NewUser, Vote,
        crate::routes::VoteResponse, crate::routes::UserResponse,
        crate::comments::CommentNode
    )),
    tags(
        (name = "stories", description = "Story submission and voting"),
        (name = "comments", description = "Comment threads and voting"),
        (name = "users", description = "Karma lookups"),
    )
)]
pub struct ApiDoc;

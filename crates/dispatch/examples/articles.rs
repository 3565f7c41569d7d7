use http::{Method, StatusCode};
use micro_dispatch::router::Mount;
use micro_dispatch::{
    inherit_actions, Action, ActionReply, ActionResult, Application, Controller, Dispatcher, Halt, Request, Router,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

struct ArticlesController {
    titles: Vec<&'static str>,
}

impl ArticlesController {
    fn index(&mut self, _dispatcher: &mut Dispatcher<'_>, _args: &[String]) -> ActionReply {
        Ok(Some(format!("<ul><li>{}</li></ul>", self.titles.join("</li><li>"))))
    }

    fn show(&mut self, dispatcher: &mut Dispatcher<'_>, args: &[String]) -> ActionReply {
        let title = self.find(dispatcher, &args[0])?;
        Ok(Some(format!("<h1>{title}</h1>")))
    }

    fn find(&self, dispatcher: &mut Dispatcher<'_>, id: &str) -> ActionResult<&'static str> {
        match id.parse::<usize>().ok().and_then(|index| self.titles.get(index)) {
            Some(title) => Ok(*title),
            None => dispatcher.halt(Halt::new().status(StatusCode::NOT_FOUND).body(format!("no article {id}"))),
        }
    }

    fn create(&mut self, dispatcher: &mut Dispatcher<'_>, _args: &[String]) -> ActionReply {
        let title = dispatcher.params().get("title").cloned().unwrap_or_default();
        let id = self.titles.len().to_string();
        info!(%title, "article created");
        dispatcher.redirect_to::<ArticlesController>("show", &[("id", &id)])?;
        Ok(None)
    }
}

impl Controller for ArticlesController {
    fn name() -> &'static str {
        "ArticlesController"
    }

    fn new(_dispatcher: &Dispatcher<'_>) -> Self {
        ArticlesController { titles: vec!["hello world", "routing in order"] }
    }

    fn actions() -> Vec<Action<Self>> {
        vec![
            Action::new("index", Self::index),
            Action::new("show", Self::show).required(&["id"]),
            Action::new("create", Self::create),
        ]
    }
}

/// Read-only view on the articles, reusing their actions.
struct ArchiveController {
    articles: ArticlesController,
}

impl Controller for ArchiveController {
    fn name() -> &'static str {
        "ArchiveController"
    }

    fn new(dispatcher: &Dispatcher<'_>) -> Self {
        ArchiveController { articles: ArticlesController::new(dispatcher) }
    }

    fn actions() -> Vec<Action<Self>> {
        inherit_actions::<ArticlesController, Self>(&["index", "show"])
    }
}

impl AsMut<ArticlesController> for ArchiveController {
    fn as_mut(&mut self) -> &mut ArticlesController {
        &mut self.articles
    }
}

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::TRACE).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let router = Router::builder()
        .mount(Mount::<ArticlesController>::new().rest())
        .mount(Mount::<ArchiveController>::new())
        .build()
        .unwrap();
    let app = Application::builder().router(router).build().unwrap();

    for (method, path) in [
        (Method::GET, "/articles"),
        (Method::GET, "/articles/1"),
        (Method::GET, "/articles/7"),
        (Method::POST, "/articles?title=draft"),
        (Method::GET, "/archive/show/0"),
        (Method::GET, "/nowhere"),
    ] {
        let request = http::Request::builder().method(method.clone()).uri(path).body(Vec::new()).unwrap();
        let response = app.handle(request).unwrap();
        info!(%method, path, status = %response.status(), body = ?response.body(), "handled");
    }
}

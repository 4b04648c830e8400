//! Subcommands and their execution against a loaded [`PhraseBook`].
//!
//! Every command prints one JSON document on success, shaped like the
//! request/response payloads a UI would exchange with the store.

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use phrasebook_core::{
    AdHocQuery, Citation, NoteKey, NoteRecord, PhraseBook, ProjectDraft, ProjectInfo, ProjectRef,
    Query, Strictness,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{CliError, CliResult};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a note for a phrase, replacing any existing one
    Add(AddArgs),

    /// Delete the note of a phrase and unlink it from related notes
    Delete {
        phrase: String,
        #[arg(long, short)]
        project: Option<String>,
    },

    /// Read a note by its composite key (PROJECT:NOTE)
    Get { key: String },

    /// Look a phrase up, in one project or in all of them
    Lookup {
        phrase: String,
        #[arg(long, short)]
        project: Option<String>,
    },

    /// Filtered search over notes
    Search(SearchArgs),

    /// Remove one relation between a phrase and a note, on both ends
    Unrelate {
        phrase: String,
        relation: String,
        /// Key of the related note (PROJECT:NOTE)
        target: String,
        #[arg(long, short)]
        project: Option<String>,
    },

    /// List all projects
    Projects,

    /// Create or update a project by name
    SaveProject(SaveProjectArgs),

    /// Delete a project with all of its notes
    RemoveProject { project: String },

    /// Select the current project
    Use { project: String },

    /// List every tag in use
    Tags,

    /// Bytes left in the storage budget
    Memfree,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub phrase: String,
    #[arg(long, short)]
    pub project: Option<String>,
    /// Full note as JSON; the flags below are applied on top
    #[arg(long)]
    pub note: Option<String>,
    #[arg(long)]
    pub star: bool,
    #[arg(long)]
    pub gist: Option<String>,
    #[arg(long)]
    pub details: Option<String>,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Record a citation of the phrase on this URL, timestamped now
    #[arg(long)]
    pub cite: Option<String>,
    /// Relation as NAME=PROJECT:NOTE
    #[arg(long = "relate")]
    pub relations: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(long)]
    pub phrase: Option<String>,
    /// exact, substring or fuzzy
    #[arg(long, value_parser = parse_strictness)]
    pub strictness: Option<Strictness>,
    #[arg(long, short)]
    pub project: Option<String>,
    #[arg(long)]
    pub starred: Option<bool>,
    #[arg(long = "tag")]
    pub tag_required: Vec<String>,
    #[arg(long = "without-tag")]
    pub tag_forbidden: Vec<String>,
    #[arg(long)]
    pub url: Option<String>,
    /// RFC 3339 timestamp
    #[arg(long, value_parser = parse_timestamp)]
    pub before: Option<DateTime<Utc>>,
    /// RFC 3339 timestamp
    #[arg(long, value_parser = parse_timestamp)]
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Args)]
pub struct SaveProjectArgs {
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub normalizer: Option<String>,
    /// Relation pair as NAME=REVERSE; repeat to declare several
    #[arg(long = "relation")]
    pub relations: Vec<String>,
}

fn parse_strictness(s: &str) -> Result<Strictness, String> {
    serde_json::from_value(Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown strictness {:?}", s))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

/// Interpret a project argument as a primary key when numeric, else a name
pub fn project_ref(project: &str) -> ProjectRef<'_> {
    match project.parse::<u32>() {
        Ok(pk) => ProjectRef::Pk(pk),
        Err(_) => ProjectRef::Name(project),
    }
}

fn split_pair<'a>(pair: &'a str, what: &str) -> CliResult<(&'a str, &'a str)> {
    pair.split_once('=')
        .map(|(a, b)| (a.trim(), b.trim()))
        .filter(|(a, b)| !a.is_empty() && !b.is_empty())
        .ok_or_else(|| CliError::InvalidArgument(format!("{} must look like A=B, got {:?}", what, pair)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NoteResponse {
    project: String,
    key: NoteKey,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectSummary<'a> {
    #[serde(flatten)]
    info: &'a ProjectInfo,
    phrases: usize,
    current: bool,
}

impl AddArgs {
    fn into_note(self) -> CliResult<NoteRecord> {
        let mut note = match &self.note {
            Some(raw) => serde_json::from_str(raw)?,
            None => NoteRecord::new(),
        };
        if self.star {
            note.starred = true;
        }
        if let Some(gist) = self.gist {
            note.gist = gist;
        }
        if let Some(details) = self.details {
            note.details = details;
        }
        note.tags.extend(self.tags);
        if let Some(url) = self.cite {
            note.citations
                .push(Citation::new(url, self.phrase.clone()).at(Utc::now()));
        }
        for pair in &self.relations {
            let (relation, target) = split_pair(pair, "relation")?;
            note = note.relate(relation, target.parse::<NoteKey>()?);
        }
        Ok(note)
    }
}

impl From<SearchArgs> for AdHocQuery {
    fn from(args: SearchArgs) -> Self {
        AdHocQuery {
            phrase: args.phrase,
            strictness: args.strictness,
            project: args.project,
            starred: args.starred,
            tag_required: args.tag_required,
            tag_forbidden: args.tag_forbidden,
            url: args.url,
            before: args.before,
            after: args.after,
        }
    }
}

/// Run one command, returning the JSON document to print
pub async fn execute(book: &mut PhraseBook, command: Command) -> CliResult<Value> {
    let current = book.current_project().pk;
    let scope = |project: &Option<String>| -> String {
        project.clone().unwrap_or_else(|| current.to_string())
    };

    match command {
        Command::Add(args) => {
            let project = scope(&args.project);
            let phrase = args.phrase.clone();
            let note = args.into_note()?;
            let key = book.add(&phrase, project_ref(&project), note).await?;
            let (project, _) = book.find_project(key.project());
            Ok(serde_json::to_value(NoteResponse { project, key })?)
        }
        Command::Delete { phrase, project } => {
            let project = scope(&project);
            let key = book.delete(&phrase, project_ref(&project)).await?;
            let (project, _) = book.find_project(key.project());
            Ok(serde_json::to_value(NoteResponse { project, key })?)
        }
        Command::Get { key } => {
            let key: NoteKey = key.parse()?;
            Ok(serde_json::to_value(book.get(key).await?)?)
        }
        Command::Lookup { phrase, project } => {
            let query = match project {
                Some(project) => {
                    let (name, _) = book.find_project(project_ref(&project));
                    Query::lookup_in(phrase, name)
                }
                None => Query::lookup(phrase),
            };
            Ok(serde_json::to_value(book.find(&query).await?)?)
        }
        Command::Search(args) => {
            let mut query = AdHocQuery::from(args);
            if let Some(project) = query.project.take() {
                query.project = Some(book.find_project(project_ref(&project)).0);
            }
            Ok(serde_json::to_value(book.find(&Query::AdHoc(query)).await?)?)
        }
        Command::Unrelate {
            phrase,
            relation,
            target,
            project,
        } => {
            let project = scope(&project);
            let target: NoteKey = target.parse()?;
            book.delete_relation(&phrase, project_ref(&project), &relation, target)
                .await?;
            Ok(json!({ "success": true }))
        }
        Command::Projects => {
            let summaries: Vec<ProjectSummary> = book
                .all_projects()
                .into_iter()
                .map(|info| ProjectSummary {
                    info,
                    phrases: book.project_index(info.pk).map_or(0, |i| i.len()),
                    current: info.pk == current,
                })
                .collect();
            Ok(serde_json::to_value(summaries)?)
        }
        Command::SaveProject(args) => {
            let mut draft = ProjectDraft::new(args.name);
            if let Some(description) = args.description {
                draft = draft.description(description);
            }
            if let Some(normalizer) = args.normalizer {
                if !book.normalizers().contains(&normalizer) {
                    tracing::warn!(
                        "Unknown normalizer {:?}; known: {:?}",
                        normalizer,
                        book.normalizers().names()
                    );
                }
                draft = draft.normalizer(normalizer);
            }
            for pair in &args.relations {
                let (relation, reverse) = split_pair(pair, "relation pair")?;
                draft = draft.relation(relation, reverse);
            }
            let pk = book.save_project(draft).await?;
            let (_, info) = book.find_project(pk);
            Ok(serde_json::to_value(info)?)
        }
        Command::RemoveProject { project } => {
            let (name, info) = book.find_project(project_ref(&project));
            if info.pk == 0 && name != project && project != "0" {
                return Err(CliError::InvalidArgument(format!(
                    "no project named {:?}",
                    project
                )));
            }
            book.remove_project(info.pk).await?;
            Ok(json!({ "removed": name, "pk": info.pk }))
        }
        Command::Use { project } => {
            let pk = book.set_current_project(project_ref(&project)).await?;
            let (name, _) = book.find_project(pk);
            Ok(json!({ "current": name, "pk": pk }))
        }
        Command::Tags => Ok(serde_json::to_value(book.tags())?),
        Command::Memfree => Ok(json!({ "memfree": book.memfree().await? })),
    }
}

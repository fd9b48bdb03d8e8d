//! The Chain Resolver: walks a line's ancestry to the concrete service that
//! owns it, building the `Service -> (Command|Event)* -> Command` path used
//! to locate configuration and pick a transport.

use std::collections::VecDeque;

use crate::error::{DispatchContext, DispatchError};
use crate::model::{Chain, ChainElem, Line, Method};
use crate::registry::InternalServiceRegistry;
use crate::story::StoryHandle;

/// Resolve the chain that owns `line`.
///
/// A line's `service` field may name a handle bound by some ancestor's
/// `output` rather than a concrete service - e.g. `slack bot` binds the name
/// `bot`, and a later `bot hears` line's chain must be walked back up to
/// `slack` to find a service the registry or application actually knows
/// about. [`find_owner`] performs that walk one level at a time; this
/// function repeats it until a concrete service (or an internal service) is
/// reached.
pub fn resolve_chain(story: &StoryHandle, line: &Line, registry: &InternalServiceRegistry) -> Result<Chain, DispatchError> {
    let mut elems: VecDeque<ChainElem> = VecDeque::new();
    let mut current = line.clone();

    loop {
        let service = current.service.clone();

        match current.method {
            Method::When => elems.push_front(ChainElem::Event(current.command.clone())),
            Method::Execute => elems.push_front(ChainElem::Command(current.command.clone())),
        }

        let resolved = story.app().services.contains_key(&service) || registry.is_internal(&service, &current.command);

        if resolved {
            elems.push_front(ChainElem::Service(service));
            break;
        }

        current = find_owner(story, &current)?;
    }

    Ok(Chain::from_deque(elems))
}

/// Walk upward from `line` until an ancestor is found whose `output` is
/// exactly `[line.service]` - the line that bound the handle `line` is
/// calling through.
fn find_owner(story: &StoryHandle, line: &Line) -> Result<Line, DispatchError> {
    let service = line.service.clone();
    let mut current = line.clone();

    loop {
        let parent_id = current.parent.clone().ok_or_else(|| {
            DispatchError::ProgrammingError {
                context: DispatchContext::new(story.name(), current.ln.clone()),
                message: format!(
                    "line {} has no parent but service \"{service}\" is not concrete or internal",
                    current.ln
                ),
            }
        })?;

        current = story.line(&parent_id).ok_or_else(|| DispatchError::ProgrammingError {
            context: DispatchContext::new(story.name(), parent_id.clone()),
            message: format!("parent line {parent_id} referenced but not found in story"),
        })?;

        if let Some(output) = &current.output {
            if output.len() == 1 && output[0] == service {
                return Ok(current);
            }
        }
    }
}

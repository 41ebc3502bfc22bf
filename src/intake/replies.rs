//! User-facing texts of the intake dialogue (Spanish).

use crate::channels::OutgoingResponse;
use crate::store::AddressRecord;

use super::triggers::{CREATE_NEW_LABEL, NEW_ADDRESS_PREFIX, select_label};

/// Which step failed, for picking the apology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStep {
    Search,
    Selection,
    Creation,
}

/// Numbered candidate list with one button per candidate plus "create new".
pub fn candidates_prompt(candidates: &[AddressRecord]) -> OutgoingResponse {
    if candidates.is_empty() {
        return no_match_prompt();
    }

    let list = candidates
        .iter()
        .enumerate()
        .map(|(i, dept)| format!("{}. {}", i + 1, dept.address))
        .collect::<Vec<_>>()
        .join("\n");

    OutgoingResponse::text(format!(
        "He encontrado los siguientes departamentos que podrían coincidir. \
         Por favor, seleccione uno o cree uno nuevo:\n{list}"
    ))
    .with_buttons(selection_buttons(candidates.len()))
}

/// Offered when no known department matches.
pub fn no_match_prompt() -> OutgoingResponse {
    OutgoingResponse::text(
        "No encontré departamentos que coincidan con su mensaje. ¿Desea crear uno nuevo?",
    )
    .with_buttons(vec![CREATE_NEW_LABEL.to_string()])
}

/// Asks for the new department's address in the literal format.
pub fn new_address_prompt() -> OutgoingResponse {
    OutgoingResponse::text(format!(
        "Por favor, proporcione la dirección exacta del nuevo departamento. \
         Empiece con `{NEW_ADDRESS_PREFIX}`"
    ))
}

/// Confirmation after a report is filed.
pub fn saved_confirmation(address: &str, content: &str, summary: Option<&str>) -> OutgoingResponse {
    let mut body = format!(
        "Información guardada exitosamente:\n\n📍 Departamento: {address}\n💬 Mensaje: {content}"
    );
    if let Some(summary) = summary.map(str::trim).filter(|s| !s.is_empty()) {
        body.push_str(&format!("\n\n📝 Resumen:\n{summary}"));
    }
    OutgoingResponse::text(body)
}

/// Invalid pick while candidates are on offer; repeats the options.
pub fn invalid_selection(candidate_count: usize) -> OutgoingResponse {
    OutgoingResponse::text(
        "No entendí su selección. Por favor, elija uno de los números de la lista \
         o cree un departamento nuevo.",
    )
    .with_buttons(selection_buttons(candidate_count))
}

/// Reply in the new-address step that doesn't carry an address.
pub fn invalid_new_address() -> OutgoingResponse {
    OutgoingResponse::text(format!(
        "No entendí la dirección. Por favor, inténtelo de nuevo empezando con \
         `{NEW_ADDRESS_PREFIX}` seguido de la dirección, por ejemplo: \
         `{NEW_ADDRESS_PREFIX}Calle Falsa 123`"
    ))
}

/// Anything outside a pending dialogue that isn't a report.
pub fn usage_hint() -> OutgoingResponse {
    OutgoingResponse::text(
        "No entendí su mensaje. Indique la dirección del departamento y lo que quiere \
         informar, por ejemplo: `En San Benito de Palermo 1584 hay una pérdida de gas`.",
    )
}

/// Generic apology for a failed lookup or write.
pub fn apology(step: FailedStep) -> OutgoingResponse {
    let text = match step {
        FailedStep::Search => {
            "Lo siento, hubo un error al procesar tu mensaje. Por favor, inténtalo de nuevo."
        }
        FailedStep::Selection => {
            "Lo siento, hubo un error al procesar su selección. Por favor, inténtalo de nuevo."
        }
        FailedStep::Creation => {
            "Lo siento, hubo un error al crear el nuevo departamento. Por favor, inténtalo de nuevo."
        }
    };
    OutgoingResponse::text(text)
}

fn selection_buttons(count: usize) -> Vec<String> {
    (1..=count)
        .map(select_label)
        .chain(std::iter::once(CREATE_NEW_LABEL.to_string()))
        .collect()
}

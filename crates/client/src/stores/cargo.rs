//! The signed-in client's cargo list and its filters.

use std::sync::Arc;

use gruzreis_shared::{Cargo, CargoStatus};

/// Status filter; `All` is the "Все" tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CargoFilter {
    #[default]
    All,
    Only(CargoStatus),
}

impl CargoFilter {
    pub fn matches(&self, cargo: &Cargo) -> bool {
        match self {
            CargoFilter::All => true,
            CargoFilter::Only(status) => cargo.status == *status,
        }
    }
}

crate::shallow_eq_by_value!(CargoFilter);

crate::store_state! {
    pub struct CargoState => CargoField {
        /// Replaced wholesale on every change so list selectors notice.
        cargos: Arc<Vec<Cargo>> => Cargos,
        loading: bool => Loading,
        error: Option<String> => Error,
        status_filter: CargoFilter => StatusFilter,
        search_query: String => SearchQuery,
    }
}

impl Default for CargoState {
    fn default() -> Self {
        Self {
            cargos: Arc::new(Vec::new()),
            loading: false,
            error: None,
            status_filter: CargoFilter::All,
            search_query: String::new(),
        }
    }
}

impl CargoState {
    /// Active cargos matching the status filter and the search query.
    pub fn filtered(&self) -> Vec<Cargo> {
        self.cargos
            .iter()
            .filter(|c| !c.status.is_archived())
            .filter(|c| self.status_filter.matches(c))
            .filter(|c| c.matches_query(&self.search_query))
            .cloned()
            .collect()
    }

    pub fn archived(&self) -> Vec<Cargo> {
        self.cargos
            .iter()
            .filter(|c| c.status.is_archived())
            .cloned()
            .collect()
    }

    pub fn find(&self, guid: &str) -> Option<&Cargo> {
        self.cargos.iter().find(|c| c.guid == guid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cargo(guid: &str, name: &str, status: CargoStatus) -> Cargo {
        Cargo {
            guid: guid.into(),
            name: name.into(),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn filters_combine_status_and_query() {
        let state = CargoState {
            cargos: Arc::new(vec![
                cargo("1", "Кирпич", CargoStatus::New),
                cargo("2", "Песок", CargoStatus::New),
                cargo("3", "Кирпич белый", CargoStatus::InWork),
                cargo("4", "Кирпич", CargoStatus::Completed),
            ]),
            status_filter: CargoFilter::Only(CargoStatus::New),
            search_query: "кирп".into(),
            ..Default::default()
        };

        let guids: Vec<String> = state.filtered().into_iter().map(|c| c.guid).collect();
        assert_eq!(guids, vec!["1"]);

        let archived: Vec<String> = state.archived().into_iter().map(|c| c.guid).collect();
        assert_eq!(archived, vec!["4"]);
        assert!(state.find("3").is_some());
    }
}

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    new_id, page_offset, AgentUpdate, MeetingStore, MeetingUpdate, NewAgent, NewMeeting,
    StoreError,
};
use crate::filter::FilterState;
use crate::models::{Agent, Meeting, MeetingStatus, Page};

#[derive(Debug, Default)]
struct Tables {
    agents: Vec<Agent>,
    meetings: Vec<Meeting>,
}

/// Process-local store. Used in development and tests; contents are lost on
/// restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn meeting_matches(meeting: &Meeting, user_id: &str, filters: &FilterState) -> bool {
    if meeting.user_id != user_id {
        return false;
    }
    if let Some(status) = filters.status {
        if meeting.status != status {
            return false;
        }
    }
    if !filters.agent_id.is_empty() && meeting.agent_id != filters.agent_id {
        return false;
    }
    filters.search.is_empty()
        || meeting
            .name
            .to_lowercase()
            .contains(&filters.search.to_lowercase())
}

fn owned_agent<'a>(tables: &'a Tables, user_id: &str, id: &str) -> Result<&'a Agent, StoreError> {
    tables
        .agents
        .iter()
        .find(|a| a.id == id && a.user_id == user_id)
        .ok_or_else(|| StoreError::NotFound {
            entity: "agent",
            id: id.to_string(),
        })
}

#[async_trait]
impl MeetingStore for MemoryStore {
    async fn list_meetings(
        &self,
        user_id: &str,
        filters: &FilterState,
        page_size: u32,
    ) -> Result<Page<Meeting>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Meeting> = tables
            .meetings
            .iter()
            .filter(|m| meeting_matches(m, user_id, filters))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = rows.len() as u64;
        let offset = usize::try_from(page_offset(filters.page(), page_size)).unwrap_or(usize::MAX);
        let items = rows
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .cloned()
            .collect();

        Ok(Page::new(items, total, page_size))
    }

    async fn create_meeting(&self, user_id: &str, meeting: NewMeeting) -> Result<Meeting, StoreError> {
        let mut tables = self.tables.write().await;
        owned_agent(&tables, user_id, &meeting.agent_id)?;

        let now = Utc::now();
        let created = Meeting {
            id: new_id(),
            name: meeting.name,
            user_id: user_id.to_string(),
            agent_id: meeting.agent_id,
            status: MeetingStatus::Upcoming,
            started_at: None,
            ended_at: None,
            transcript_url: None,
            recording_url: None,
            summary: None,
            created_at: now,
            updated_at: now,
        };
        tables.meetings.push(created.clone());
        Ok(created)
    }

    async fn update_meeting(&self, user_id: &str, update: MeetingUpdate) -> Result<Meeting, StoreError> {
        let mut tables = self.tables.write().await;
        owned_agent(&tables, user_id, &update.agent_id)?;

        let meeting = tables
            .meetings
            .iter_mut()
            .find(|m| m.id == update.id && m.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "meeting",
                id: update.id.clone(),
            })?;
        meeting.name = update.name;
        meeting.agent_id = update.agent_id;
        meeting.updated_at = Utc::now();
        Ok(meeting.clone())
    }

    async fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>, StoreError> {
        let tables = self.tables.read().await;
        let mut agents: Vec<Agent> = tables
            .agents
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(agents)
    }

    async fn create_agent(&self, user_id: &str, agent: NewAgent) -> Result<Agent, StoreError> {
        let now = Utc::now();
        let created = Agent {
            id: new_id(),
            name: agent.name,
            user_id: user_id.to_string(),
            instructions: agent.instructions,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.agents.push(created.clone());
        Ok(created)
    }

    async fn update_agent(&self, user_id: &str, update: AgentUpdate) -> Result<Agent, StoreError> {
        let mut tables = self.tables.write().await;
        let agent = tables
            .agents
            .iter_mut()
            .find(|a| a.id == update.id && a.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "agent",
                id: update.id.clone(),
            })?;
        agent.name = update.name;
        agent.instructions = update.instructions;
        agent.updated_at = Utc::now();
        Ok(agent.clone())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryStore, Agent, Agent) {
        let store = MemoryStore::new();
        let tutor = store
            .create_agent(
                "u1",
                NewAgent {
                    name: "Tutor".to_string(),
                    instructions: "Teach".to_string(),
                },
            )
            .await
            .unwrap();
        let coach = store
            .create_agent(
                "u1",
                NewAgent {
                    name: "Coach".to_string(),
                    instructions: "Motivate".to_string(),
                },
            )
            .await
            .unwrap();
        for (name, agent) in [
            ("Weekly Retro", &tutor),
            ("Math lesson", &tutor),
            ("Morning run", &coach),
        ] {
            store
                .create_meeting(
                    "u1",
                    NewMeeting {
                        name: name.to_string(),
                        agent_id: agent.id.clone(),
                    },
                )
                .await
                .unwrap();
        }
        (store, tutor, coach)
    }

    #[tokio::test]
    async fn test_list_scoped_to_user() {
        let (store, _, _) = seeded().await;
        let page = store
            .list_meetings("someone-else", &FilterState::default(), 10)
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let (store, _, _) = seeded().await;
        let filters = FilterState::default().with_search("RETRO");
        let page = store.list_meetings("u1", &filters, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Weekly Retro");
    }

    #[tokio::test]
    async fn test_agent_and_status_filters() {
        let (store, tutor, _) = seeded().await;
        let filters = FilterState::default().with_agent_id(tutor.id.clone());
        assert_eq!(store.list_meetings("u1", &filters, 10).await.unwrap().total, 2);

        let filters = filters.with_status(Some(MeetingStatus::Active));
        assert_eq!(store.list_meetings("u1", &filters, 10).await.unwrap().total, 0);

        let filters = FilterState::default().with_status(Some(MeetingStatus::Upcoming));
        assert_eq!(store.list_meetings("u1", &filters, 10).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_pagination() {
        let (store, _, _) = seeded().await;
        let first = store
            .list_meetings("u1", &FilterState::default(), 2)
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, 3);
        assert_eq!(first.total_pages, 2);

        let second = store
            .list_meetings("u1", &FilterState::default().with_page(2), 2)
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);

        let beyond = store
            .list_meetings("u1", &FilterState::default().with_page(9), 2)
            .await
            .unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 3);
    }

    #[tokio::test]
    async fn test_create_meeting_requires_owned_agent() {
        let (store, tutor, _) = seeded().await;
        let err = store
            .create_meeting(
                "u2",
                NewMeeting {
                    name: "Sneaky".to_string(),
                    agent_id: tutor.id.clone(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "agent", .. }));
    }

    #[tokio::test]
    async fn test_update_meeting_and_agent() {
        let (store, tutor, coach) = seeded().await;
        let meeting = store
            .list_meetings("u1", &FilterState::default().with_search("math"), 10)
            .await
            .unwrap()
            .items
            .remove(0);

        let updated = store
            .update_meeting(
                "u1",
                MeetingUpdate {
                    id: meeting.id.clone(),
                    name: "Algebra".to_string(),
                    agent_id: coach.id.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Algebra");
        assert_eq!(updated.agent_id, coach.id);

        let agent = store
            .update_agent(
                "u1",
                AgentUpdate {
                    id: tutor.id.clone(),
                    name: "Senior Tutor".to_string(),
                    instructions: "Teach patiently".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(agent.name, "Senior Tutor");
        assert_eq!(store.list_agents("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_meeting_is_not_found() {
        let (store, tutor, _) = seeded().await;
        let err = store
            .update_meeting(
                "u1",
                MeetingUpdate {
                    id: "missing".to_string(),
                    name: "x".to_string(),
                    agent_id: tutor.id.clone(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "meeting", .. }));
    }
}

use plateshare_messaging::{
    ChatBackend, Error, FileStorage, MemoryStorage, MessagingBackend, Profile, Result,
    StorageAdapter, UserId,
};
use std::sync::Arc;

fn profile(id: &str, name: &str) -> Profile {
    Profile {
        user_id: UserId::new(id),
        full_name: Some(name.to_string()),
        avatar_url: None,
    }
}

fn backend_with_users() -> ChatBackend {
    let backend = ChatBackend::new(None);
    backend.register_user(&profile("alice", "Alice Moore")).unwrap();
    backend.register_user(&profile("bob", "Bob Tran")).unwrap();
    backend
}

#[test]
fn first_contact_creates_one_conversation_and_first_message() -> Result<()> {
    let backend = backend_with_users();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    let conversation = backend.get_or_create_conversation(&alice, &bob)?;
    assert!(backend.list_since(&alice, &conversation.id, None)?.is_empty());

    backend.append(&conversation.id, &alice, "Hi")?;

    let messages = backend.list_since(&bob, &conversation.id, None)?;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender_id, alice);
    assert_eq!(messages[0].body, "Hi");
    assert!(messages[0].read_at.is_none());

    // Same pair from the other side resolves to the same row.
    let again = backend.get_or_create_conversation(&bob, &alice)?;
    assert_eq!(again.id, conversation.id);

    Ok(())
}

#[test]
fn racing_get_or_create_from_both_sides_yields_one_row() {
    let backend = Arc::new(backend_with_users());

    let mut handles = Vec::new();
    for flip in [false, true, false, true, false, true] {
        let backend = backend.clone();
        handles.push(std::thread::spawn(move || {
            let (caller, other) = if flip {
                (UserId::new("bob"), UserId::new("alice"))
            } else {
                (UserId::new("alice"), UserId::new("bob"))
            };
            backend.get_or_create_conversation(&caller, &other).unwrap().id
        }));
    }

    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));

    let summaries = backend.summaries(&UserId::new("alice")).unwrap();
    assert_eq!(summaries.len(), 1);
}

#[test]
fn appends_come_back_in_commit_order_with_unique_ids() -> Result<()> {
    let backend = backend_with_users();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let conversation = backend.get_or_create_conversation(&alice, &bob)?;

    for i in 0..20 {
        let sender = if i % 3 == 0 { &bob } else { &alice };
        backend.append(&conversation.id, sender, &format!("message {i}"))?;
    }

    let messages = backend.list_since(&alice, &conversation.id, None)?;
    assert_eq!(messages.len(), 20);
    for (i, message) in messages.iter().enumerate() {
        assert_eq!(message.body, format!("message {i}"));
    }

    let mut ids: Vec<_> = messages.iter().map(|m| m.id.clone()).collect();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    ids.dedup();
    assert_eq!(ids.len(), 20);

    Ok(())
}

#[test]
fn mark_read_drops_unread_to_zero_and_is_idempotent() -> Result<()> {
    let backend = backend_with_users();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let conversation = backend.get_or_create_conversation(&alice, &bob)?;

    backend.append(&conversation.id, &alice, "one")?;
    backend.append(&conversation.id, &alice, "two")?;

    assert_eq!(backend.unread_count(&conversation.id, &bob)?, 2);

    assert_eq!(backend.mark_read(&conversation.id, &bob)?, 2);
    assert_eq!(backend.unread_count(&conversation.id, &bob)?, 0);

    let stamps_first: Vec<_> = backend
        .list_since(&bob, &conversation.id, None)?
        .into_iter()
        .map(|m| m.read_at)
        .collect();

    // Second call changes nothing observable.
    assert_eq!(backend.mark_read(&conversation.id, &bob)?, 0);
    let stamps_second: Vec<_> = backend
        .list_since(&bob, &conversation.id, None)?
        .into_iter()
        .map(|m| m.read_at)
        .collect();
    assert_eq!(stamps_first, stamps_second);

    Ok(())
}

#[test]
fn summaries_join_profile_last_message_and_unread() -> Result<()> {
    let backend = backend_with_users();
    backend.register_user(&profile("carol", "Carol Diaz"))?;
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let carol = UserId::new("carol");

    let with_bob = backend.get_or_create_conversation(&alice, &bob)?;
    backend.append(&with_bob.id, &bob, "leftover soup available")?;

    // Millisecond timestamps can collide across conversations; give the
    // second one strictly later activity.
    std::thread::sleep(std::time::Duration::from_millis(5));

    let with_carol = backend.get_or_create_conversation(&alice, &carol)?;
    backend.append(&with_carol.id, &alice, "still have the bread?")?;
    backend.append(&with_carol.id, &carol, "yes, come by")?;

    let summaries = backend.summaries(&alice)?;
    assert_eq!(summaries.len(), 2);

    // Most recent activity first: carol's conversation got the last message.
    assert_eq!(summaries[0].conversation_id, with_carol.id);
    assert_eq!(summaries[0].counterpart.full_name.as_deref(), Some("Carol Diaz"));
    assert_eq!(
        summaries[0].last_message.as_ref().unwrap().body,
        "yes, come by"
    );
    assert_eq!(summaries[0].unread_count, 1);

    assert_eq!(summaries[1].conversation_id, with_bob.id);
    assert_eq!(summaries[1].unread_count, 1);
    assert_eq!(
        summaries[1].last_message.as_ref().unwrap().sender_id,
        bob
    );

    Ok(())
}

#[test]
fn summary_for_counterpart_without_profile_still_renders() -> Result<()> {
    // A profile row can vanish (account cleanup outpaces the
    // conversation table); the list must fall back, not error out.
    let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryStorage::new());
    let backend = ChatBackend::new(Some(storage.clone()));
    backend.register_user(&profile("alice", "Alice Moore"))?;
    backend.register_user(&profile("bob", "Bob Tran"))?;
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    let conversation = backend.get_or_create_conversation(&alice, &bob)?;
    backend.append(&conversation.id, &bob, "hello")?;

    storage.del("profile/bob")?;

    let summaries = backend.summaries(&alice)?;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].counterpart.user_id, bob);
    assert!(summaries[0].counterpart.full_name.is_none());
    assert!(summaries[0].counterpart.avatar_url.is_none());
    Ok(())
}

#[test]
fn error_taxonomy_at_the_surface() {
    let backend = backend_with_users();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let stranger = UserId::new("stranger");

    // Unknown caller.
    assert!(matches!(
        backend.get_or_create_conversation(&stranger, &alice),
        Err(Error::Unauthenticated)
    ));

    // Known caller, unknown counterpart.
    assert!(matches!(
        backend.get_or_create_conversation(&alice, &stranger),
        Err(Error::InvalidArgument(_))
    ));

    // Self-conversation.
    assert!(matches!(
        backend.get_or_create_conversation(&alice, &alice),
        Err(Error::InvalidArgument(_))
    ));

    let conversation = backend.get_or_create_conversation(&alice, &bob).unwrap();

    // Empty and oversized bodies.
    assert!(matches!(
        backend.append(&conversation.id, &alice, "  \n "),
        Err(Error::InvalidArgument(_))
    ));

    // Outsiders get Forbidden whether or not the conversation exists.
    backend.register_user(&profile("mallory", "Mallory")).unwrap();
    let mallory = UserId::new("mallory");
    assert!(matches!(
        backend.append(&conversation.id, &mallory, "hi"),
        Err(Error::Forbidden)
    ));
    assert!(matches!(
        backend.list_since(&mallory, &conversation.id, None),
        Err(Error::Forbidden)
    ));
    assert!(matches!(
        backend.subscribe_messages(&mallory, &conversation.id),
        Err(Error::Forbidden)
    ));
}

#[test]
fn offline_backend_fails_transient_and_recovers() {
    let backend = backend_with_users();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let conversation = backend.get_or_create_conversation(&alice, &bob).unwrap();

    backend.set_offline(true);
    assert!(matches!(
        backend.append(&conversation.id, &alice, "anyone there?"),
        Err(Error::Transient(_))
    ));

    backend.set_offline(false);
    assert!(backend.append(&conversation.id, &alice, "anyone there?").is_ok());
}

#[test]
fn file_backed_backend_survives_restart() -> Result<()> {
    let dir = tempfile::TempDir::new().unwrap();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    let conversation_id = {
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(FileStorage::new(dir.path().to_path_buf())?);
        let backend = ChatBackend::new(Some(storage));
        backend.register_user(&profile("alice", "Alice Moore"))?;
        backend.register_user(&profile("bob", "Bob Tran"))?;

        let conversation = backend.get_or_create_conversation(&alice, &bob)?;
        backend.append(&conversation.id, &alice, "before restart")?;
        conversation.id
    };

    let storage: Arc<dyn StorageAdapter> = Arc::new(FileStorage::new(dir.path().to_path_buf())?);
    let backend = ChatBackend::new(Some(storage));

    let conversation = backend.get_or_create_conversation(&bob, &alice)?;
    assert_eq!(conversation.id, conversation_id);

    let messages = backend.list_since(&bob, &conversation.id, None)?;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "before restart");

    // Sequence assignment continues, it does not restart from 1.
    let next = backend.append(&conversation.id, &bob, "after restart")?;
    assert_eq!(next.seq, 2);

    Ok(())
}

diesel::table! {
    notes (id) {
        id -> Integer,
        user_id -> Text,
        content -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    schedules (id) {
        id -> Integer,
        user_id -> Text,
        title -> Text,
        description -> Text,
        scheduled_time -> Text,
        remind_before -> BigInt,
        created_at -> Text,
        delivered -> Bool,
    }
}

diesel::table! {
    reminders (id) {
        id -> Integer,
        user_id -> Text,
        content -> Text,
        remind_time -> Text,
        created_at -> Text,
        delivered -> Bool,
    }
}

diesel::table! {
    user_states (user_id) {
        user_id -> Text,
        state -> Text,
        data -> Nullable<Text>,
    }
}

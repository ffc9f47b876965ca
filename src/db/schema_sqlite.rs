diesel::table! {
    sheets (container, name) {
        container -> Text,
        name -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    sheet_rows (container, name, position) {
        container -> Text,
        name -> Text,
        position -> Integer,
        row_key -> Text,
        cells -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(sheets, sheet_rows);

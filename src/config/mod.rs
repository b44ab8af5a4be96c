pub mod bot_profile;

mod helpers;
mod tests_format;
mod tests_manager;

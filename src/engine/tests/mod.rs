mod tests_flush;

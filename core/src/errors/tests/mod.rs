mod database_error_tests;
